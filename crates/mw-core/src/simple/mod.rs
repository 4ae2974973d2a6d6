//! Simple workflow format: the plain steps/connections structure the
//! workflow-save endpoint consumes and the editor loads back.

use crate::step::{InputDefinition, OutputDefinition, PostJobAction, StepDefinition, StepType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SimpleWorkflow: top-level document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleWorkflow {
    #[serde(default)]
    pub name: Option<String>,

    /// Steps keyed by their decimal step id.
    pub steps: BTreeMap<String, SimpleStep>,
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleStep {
    pub id: u32,

    #[serde(rename = "type", default)]
    pub step_type: StepType,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub tool_id: Option<String>,

    #[serde(default)]
    pub tool_state: Option<serde_json::Value>,

    #[serde(default)]
    pub tool_errors: Option<serde_json::Value>,

    #[serde(default)]
    pub annotation: Option<String>,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub uuid: Option<Uuid>,

    /// UI position hint.
    #[serde(default)]
    pub position: Option<Position>,

    #[serde(default)]
    pub post_job_actions: BTreeMap<String, PostJobAction>,

    #[serde(default)]
    pub workflow_outputs: Vec<String>,

    #[serde(default)]
    pub data_inputs: Vec<InputDefinition>,

    #[serde(default)]
    pub data_outputs: Vec<OutputDefinition>,

    /// Input name → upstream outputs; `null` for an unconnected input.
    #[serde(default)]
    pub input_connections: BTreeMap<String, Option<Connections>>,
}

impl SimpleStep {
    /// The step's terminal and metadata definition, without graph placement.
    pub fn definition(&self) -> StepDefinition {
        StepDefinition {
            step_type: self.step_type,
            name: self.name.clone(),
            tool_id: self.tool_id.clone(),
            tool_state: self.tool_state.clone(),
            tool_errors: self.tool_errors.clone(),
            annotation: self.annotation.clone(),
            label: self.label.clone(),
            uuid: self.uuid,
            post_job_actions: self.post_job_actions.clone(),
            workflow_outputs: self.workflow_outputs.clone(),
            data_inputs: self.data_inputs.clone(),
            data_outputs: self.data_outputs.clone(),
        }
    }
}

/// Older documents store a single connection as a bare object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Connections {
    One(ConnectionRef),
    Many(Vec<ConnectionRef>),
}

impl Connections {
    pub fn into_vec(self) -> Vec<ConnectionRef> {
        match self {
            Connections::One(c) => vec![c],
            Connections::Many(cs) => cs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionRef {
    /// Upstream step id.
    pub id: u32,
    pub output_name: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub left: f64,
    pub top: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
