//! Builders shared by the unit tests.

use crate::{EditorConfig, NodeId, TerminalId, Workflow};
use mw_core::datatype::DatatypeRegistry;
use mw_core::step::{InputDefinition, InputType, OutputDefinition, StepDefinition};

pub fn registry() -> DatatypeRegistry {
    let mut reg = DatatypeRegistry::new();
    reg.register("data", "Data", Vec::<String>::new());
    reg.register("txt", "Text", ["Data"]);
    reg.register("tabular", "Tabular", ["Text", "Data"]);
    reg.register("bed", "Bed", ["Tabular", "Text", "Data"]);
    reg.register("fastq", "Fastq", ["Data"]);
    reg.register("fastqsanger", "FastqSanger", ["Fastq", "Data"]);
    reg
}

pub fn workflow() -> Workflow {
    Workflow::new(EditorConfig::default(), registry())
}

pub fn dataset_in(name: &str, ext: &str) -> InputDefinition {
    InputDefinition {
        name: name.into(),
        extensions: vec![ext.into()],
        multiple: false,
        input_type: InputType::Dataset,
        collection_type: None,
    }
}

pub fn multiple_in(name: &str, ext: &str) -> InputDefinition {
    InputDefinition {
        multiple: true,
        ..dataset_in(name, ext)
    }
}

pub fn collection_in(name: &str, ext: &str, collection_type: Option<&str>) -> InputDefinition {
    InputDefinition {
        input_type: InputType::DatasetCollection,
        collection_type: collection_type.map(str::to_string),
        ..dataset_in(name, ext)
    }
}

pub fn dataset_out(name: &str, ext: &str) -> OutputDefinition {
    OutputDefinition {
        name: name.into(),
        extensions: vec![ext.into()],
        collection: false,
        collection_type: None,
    }
}

pub fn collection_out(name: &str, ext: &str, collection_type: &str) -> OutputDefinition {
    OutputDefinition {
        collection: true,
        collection_type: Some(collection_type.into()),
        ..dataset_out(name, ext)
    }
}

pub fn tool(
    name: &str,
    inputs: Vec<InputDefinition>,
    outputs: Vec<OutputDefinition>,
) -> StepDefinition {
    StepDefinition {
        name: name.into(),
        tool_id: Some(name.to_lowercase()),
        data_inputs: inputs,
        data_outputs: outputs,
        ..Default::default()
    }
}

/// Add a step; returns the node with its input and output terminals in
/// declaration order.
pub fn add(
    wf: &mut Workflow,
    step: StepDefinition,
) -> (NodeId, Vec<TerminalId>, Vec<TerminalId>) {
    let id = wf.add_node(step).unwrap();
    let node = wf.node(id).unwrap();
    (id, node.inputs.clone(), node.outputs.clone())
}

/// A tool producing a single `txt` collection of the given type.
pub fn collection_source(wf: &mut Workflow, collection_type: &str) -> TerminalId {
    let step = tool(
        "Split",
        vec![],
        vec![collection_out("out", "txt", collection_type)],
    );
    add(wf, step).2[0]
}

/// A tool producing a single dataset of the given extension.
pub fn dataset_source(wf: &mut Workflow, ext: &str) -> TerminalId {
    add(wf, tool("Make", vec![], vec![dataset_out("out", ext)])).2[0]
}
