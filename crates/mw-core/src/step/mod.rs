//! Step definitions: the tool metadata a node is built from.
//!
//! These arrive as plain JSON from the tool metadata service (when a step is
//! added or its form changes) and inside saved workflows.

use crate::collection_type::{CollectionType, CollectionTypeError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepError {
    #[error("input '{name}': {source}")]
    InputCollectionType {
        name: String,
        #[source]
        source: CollectionTypeError,
    },
    #[error("output '{name}': {source}")]
    OutputCollectionType {
        name: String,
        #[source]
        source: CollectionTypeError,
    },
    #[error("output '{0}' is a collection but declares no collection type")]
    MissingOutputCollectionType(String),
    #[error("duplicate terminal name '{0}'")]
    DuplicateTerminal(String),
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[default]
    Tool,
    DataInput,
    DataCollectionInput,
    ParameterInput,
    Subworkflow,
    Pause,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepDefinition {
    #[serde(rename = "type", default)]
    pub step_type: StepType,

    /// Display name (tool name or input label).
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub tool_id: Option<String>,

    /// Opaque tool form state, round-tripped untouched.
    #[serde(default)]
    pub tool_state: Option<serde_json::Value>,

    /// Opaque tool validation errors, round-tripped untouched.
    #[serde(default)]
    pub tool_errors: Option<serde_json::Value>,

    #[serde(default)]
    pub annotation: Option<String>,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub uuid: Option<Uuid>,

    /// Keyed by `action_type + output_name`.
    #[serde(default)]
    pub post_job_actions: BTreeMap<String, PostJobAction>,

    /// Output names marked as workflow outputs.
    #[serde(default)]
    pub workflow_outputs: Vec<String>,

    #[serde(default)]
    pub data_inputs: Vec<InputDefinition>,

    #[serde(default)]
    pub data_outputs: Vec<OutputDefinition>,
}

impl StepDefinition {
    /// Parse every declared collection type and reject duplicate terminal names.
    pub fn validate(&self) -> Result<(), StepError> {
        let mut seen = HashSet::new();
        for input in &self.data_inputs {
            if !seen.insert(input.name.as_str()) {
                return Err(StepError::DuplicateTerminal(input.name.clone()));
            }
            input.declared_collection_type()?;
        }
        let mut seen = HashSet::new();
        for output in &self.data_outputs {
            if !seen.insert(output.name.as_str()) {
                return Err(StepError::DuplicateTerminal(output.name.clone()));
            }
            output.declared_collection_type()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Terminals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    Dataset,
    DatasetCollection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDefinition {
    pub name: String,
    /// Accepted extensions.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Whether several datasets may be connected at once.
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub input_type: InputType,
    #[serde(default)]
    pub collection_type: Option<String>,
}

impl InputDefinition {
    pub fn is_collection(&self) -> bool {
        self.input_type == InputType::DatasetCollection
    }

    /// `Null` for dataset inputs, `Any` for collection inputs without a type.
    pub fn declared_collection_type(&self) -> Result<CollectionType, StepError> {
        if !self.is_collection() {
            return Ok(CollectionType::Null);
        }
        CollectionType::from_declared(self.collection_type.as_deref()).map_err(|source| {
            StepError::InputCollectionType {
                name: self.name.clone(),
                source,
            }
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDefinition {
    pub name: String,
    /// Produced extensions.
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub collection: bool,
    #[serde(default)]
    pub collection_type: Option<String>,
}

impl OutputDefinition {
    /// `Null` for dataset outputs; collection outputs must name a concrete type.
    pub fn declared_collection_type(&self) -> Result<CollectionType, StepError> {
        if !self.collection {
            return Ok(CollectionType::Null);
        }
        let raw = self
            .collection_type
            .as_deref()
            .ok_or_else(|| StepError::MissingOutputCollectionType(self.name.clone()))?;
        CollectionType::parse(raw).map_err(|source| StepError::OutputCollectionType {
            name: self.name.clone(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Post-job actions
// ---------------------------------------------------------------------------

pub const CHANGE_DATATYPE_ACTION: &str = "ChangeDatatypeAction";
pub const HIDE_DATASET_ACTION: &str = "HideDatasetAction";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostJobAction {
    pub action_type: String,
    /// Empty means "every output".
    #[serde(default)]
    pub output_name: String,
    #[serde(default)]
    pub action_arguments: Option<serde_json::Value>,
}

impl PostJobAction {
    pub fn hide(output_name: impl Into<String>) -> Self {
        Self {
            action_type: HIDE_DATASET_ACTION.into(),
            output_name: output_name.into(),
            action_arguments: Some(serde_json::json!({})),
        }
    }

    pub fn change_datatype(output_name: impl Into<String>, newtype: impl Into<String>) -> Self {
        Self {
            action_type: CHANGE_DATATYPE_ACTION.into(),
            output_name: output_name.into(),
            action_arguments: Some(serde_json::json!({ "newtype": newtype.into() })),
        }
    }

    /// Key under which the action is stored on its step.
    pub fn key(&self) -> String {
        format!("{}{}", self.action_type, self.output_name)
    }

    pub fn is_hide(&self) -> bool {
        self.action_type == HIDE_DATASET_ACTION
    }

    /// The extension a `ChangeDatatypeAction` retags `output` with, if it applies.
    pub fn retagged_extension(&self, output: &str) -> Option<&str> {
        if self.action_type != CHANGE_DATATYPE_ACTION {
            return None;
        }
        if !self.output_name.is_empty() && self.output_name != output {
            return None;
        }
        self.action_arguments.as_ref()?.get("newtype")?.as_str()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
