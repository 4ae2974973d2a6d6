//! mapwire: replay a saved workflow through the editor engine, then check it,
//! lay it out or rectify its workflow outputs.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mw_core::prelude::*;
use mw_editor::{DroppedConnection, EditorConfig, Workflow};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Collection-aware workflow checker and formatter
#[derive(Parser, Debug)]
#[command(name = "mapwire", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-validate every saved connection and report map-over state
    Check {
        #[command(flatten)]
        source: Source,
    },
    /// Arrange steps in columns by dependency level
    Layout {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        sink: Sink,
    },
    /// Hide every tool output that is not a marked workflow output
    Rectify {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        sink: Sink,
    },
}

#[derive(Args, Debug)]
struct Source {
    /// Path to the saved workflow JSON
    workflow: PathBuf,
    /// Datatype tables JSON (`ext_to_class_name` / `class_to_classes`)
    #[arg(long)]
    datatypes: Option<PathBuf>,
    /// Editor config JSON
    #[arg(long)]
    config: Option<PathBuf>,
    /// Fail on saved connections that violate the connection rule instead of
    /// dropping them
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct Sink {
    /// Write the resulting workflow here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

// --- Check report ---

#[derive(Serialize)]
struct CheckReport {
    name: Option<String>,
    steps: usize,
    connections: Vec<ConnectionStatus>,
    mapped: Vec<MappedTerminal>,
}

#[derive(Serialize)]
struct ConnectionStatus {
    from: String,
    to: String,
    valid: bool,
}

#[derive(Serialize)]
struct MappedTerminal {
    step: u32,
    terminal: String,
    map_over: CollectionType,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check { source } => check(&source),
        Command::Layout { source, sink } => {
            let (mut wf, _) = load(&source)?;
            wf.layout().context("Failed to lay out workflow")?;
            write(&wf.to_simple(), &sink)
        }
        Command::Rectify { source, sink } => {
            let (mut wf, _) = load(&source)?;
            wf.rectify_workflow_outputs();
            write(&wf.to_simple(), &sink)
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {what} {}", path.display()))
}

fn load(source: &Source) -> Result<(Workflow, Vec<DroppedConnection>)> {
    let mut config = match &source.config {
        Some(path) => EditorConfig::load(path)?,
        None => EditorConfig::default(),
    };
    config.strict_load |= source.strict;

    let datatypes: DatatypeRegistry = match &source.datatypes {
        Some(path) => read_json(path, "datatype tables")?,
        None => DatatypeRegistry::new(),
    };
    if datatypes.is_empty() {
        tracing::warn!("no datatype tables given, only identical extensions will match");
    }

    let simple: SimpleWorkflow = read_json(&source.workflow, "workflow")?;
    let (wf, dropped) = Workflow::load_simple(&simple, datatypes, config)
        .with_context(|| format!("Failed to load workflow {}", source.workflow.display()))?;
    tracing::info!(
        "{}: {} steps, {} connections",
        source.workflow.display(),
        wf.node_count(),
        wf.connector_count()
    );
    Ok((wf, dropped))
}

fn check(source: &Source) -> Result<()> {
    let (wf, dropped) = load(source)?;
    let report = build_report(&wf, &dropped);
    println!("{}", serde_json::to_string_pretty(&report)?);
    verdict(&report)
}

/// Established connectors plus the saved connections the load had to drop.
fn build_report(wf: &Workflow, dropped: &[DroppedConnection]) -> CheckReport {
    let endpoint = |terminal| {
        wf.terminal(terminal)
            .map(|t| format!("{}.{}", t.node.0, t.name))
            .unwrap_or_default()
    };
    let mut connections: Vec<ConnectionStatus> = wf
        .connectors()
        .map(|c| ConnectionStatus {
            from: endpoint(c.output),
            to: endpoint(c.input),
            valid: wf.attachable(c.input, c.output),
        })
        .collect();
    connections.extend(dropped.iter().map(|d| ConnectionStatus {
        from: format!("{}.{}", d.from.id, d.from.output_name),
        to: format!("{}.{}", d.step, d.input),
        valid: false,
    }));

    let mapped = wf
        .nodes()
        .flat_map(|node| node.inputs.iter().chain(&node.outputs))
        .filter_map(|id| wf.terminal(*id))
        .filter(|t| t.is_mapped_over())
        .map(|t| MappedTerminal {
            step: t.node.0,
            terminal: t.name.clone(),
            map_over: t.map_over().clone(),
        })
        .collect();

    CheckReport {
        name: wf.name.clone(),
        steps: wf.node_count(),
        connections,
        mapped,
    }
}

fn verdict(report: &CheckReport) -> Result<()> {
    let invalid = report.connections.iter().filter(|c| !c.valid).count();
    if invalid > 0 {
        bail!("{invalid} saved connection(s) violate the connection rule");
    }
    Ok(())
}

fn write(simple: &SimpleWorkflow, sink: &Sink) -> Result<()> {
    let json = serde_json::to_string_pretty(simple)?;
    match &sink.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
