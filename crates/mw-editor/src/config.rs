//! Editor configuration.

use crate::layout::Size;
use crate::EditorError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub layout: LayoutConfig,

    /// Size assumed for a node until the UI reports its rendered size.
    pub node_size: Size,

    /// Fail a load on a saved connection that violates the connection rule,
    /// instead of dropping it with a warning.
    pub strict_load: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Gap between columns.
    pub horizontal_pad: f64,
    /// Gap between nodes in a column.
    pub vertical_pad: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_pad: 80.0,
            vertical_pad: 30.0,
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        serde_json::from_str(json).map_err(|e| EditorError::Config(e.to_string()))
    }

    /// Load a JSON config file; missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, EditorError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EditorError::Config(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_json(&content)
    }
}
