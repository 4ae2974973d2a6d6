//! mw-editor: Workflow editor graph engine
//!
//! Owns the node/terminal/connector graph of a workflow being edited and
//! enforces the connection rules: datatype compatibility, collection type
//! matching and map-over propagation across the terminals of a node.
//!
//! Every operation is synchronous and leaves the graph consistent before it
//! returns. Visual side effects are reported as [`EditorEvent`]s that the UI
//! drains after each gesture.

pub mod compat;
pub mod config;
pub mod connect;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod graph;
pub mod layout;
pub mod nodes;
pub mod outputs;
pub mod simple;

pub use config::EditorConfig;
pub use graph::{
    Connector, ConnectorId, EditorEvent, Node, NodeId, Terminal, TerminalId, TerminalKind,
    TerminalMapping, Workflow,
};
pub use layout::{Bounds, Size};
pub use simple::DroppedConnection;

use mw_core::step::StepError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("invalid step definition: {0}")]
    Step(#[from] StepError),
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("terminal not found: {0}")]
    TerminalNotFound(TerminalId),
    #[error("connector not found: {0}")]
    ConnectorNotFound(ConnectorId),
    #[error("terminal {0} is not an output terminal")]
    NotAnOutput(TerminalId),
    #[error("terminal {0} is not an input terminal")]
    NotAnInput(TerminalId),
    #[error("output {output} cannot be connected to input {input}")]
    NotAttachable {
        output: TerminalId,
        input: TerminalId,
    },
    #[error("duplicate step id {0}")]
    DuplicateNode(NodeId),
    #[error("step {step}: unknown {what} '{name}'")]
    UnknownReference {
        step: u32,
        what: &'static str,
        name: String,
    },
    #[error("no {0} ids left")]
    IdOverflow(&'static str),
    #[error("step {step}: saved connection {from_step}.{output} -> {input} violates the connection rule")]
    InvalidConnection {
        step: u32,
        input: String,
        from_step: u32,
        output: String,
    },
    #[error("workflow graph contains a cycle")]
    Cycle,
    #[error("config error: {0}")]
    Config(String),
}
