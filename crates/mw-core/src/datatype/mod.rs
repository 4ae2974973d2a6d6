//! Datatype tables: extension → class name, class name → ancestor classes.
//!
//! The host application publishes these two tables once; the editor uses them
//! to decide whether a produced extension can feed an input that accepts
//! another extension.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

/// Extension wildcard carried by workflow input steps.
pub const INPUT_EXTENSION: &str = "input";

/// Extension wildcard carried by workflow collection input steps.
pub const INPUT_COLLECTION_EXTENSION: &str = "input_collection";

/// Whether an extension is one of the generic workflow-input wildcards.
pub fn is_wildcard(ext: &str) -> bool {
    ext == INPUT_EXTENSION || ext == INPUT_COLLECTION_EXTENSION
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatatypeRegistry {
    /// e.g. "fastqsanger" → "galaxy.datatypes.sequence.FastqSanger"
    #[serde(default)]
    pub ext_to_class_name: HashMap<String, String>,

    /// Class name → every class it is an instance of (itself included).
    /// The host sends each set either as a list or as a `{class: true}` map.
    #[serde(default, deserialize_with = "deserialize_class_sets")]
    pub class_to_classes: HashMap<String, HashSet<String>>,
}

impl DatatypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension and the classes its datatype class descends from.
    pub fn register(
        &mut self,
        ext: impl Into<String>,
        class_name: impl Into<String>,
        ancestors: impl IntoIterator<Item = impl Into<String>>,
    ) {
        let class_name = class_name.into();
        let entry = self.class_to_classes.entry(class_name.clone()).or_default();
        entry.insert(class_name.clone());
        entry.extend(ancestors.into_iter().map(Into::into));
        self.ext_to_class_name.insert(ext.into(), class_name);
    }

    /// Whether data tagged `ext` may be used where `parent_ext` is expected.
    pub fn is_subtype(&self, ext: &str, parent_ext: &str) -> bool {
        if ext == parent_ext {
            return true;
        }
        let (Some(child), Some(parent)) = (
            self.ext_to_class_name.get(ext),
            self.ext_to_class_name.get(parent_ext),
        ) else {
            return false;
        };
        self.class_to_classes
            .get(child)
            .is_some_and(|classes| classes.contains(parent))
    }

    pub fn len(&self) -> usize {
        self.ext_to_class_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ext_to_class_name.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassSet {
    List(HashSet<String>),
    Map(HashMap<String, serde_json::Value>),
}

fn deserialize_class_sets<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, HashSet<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: HashMap<String, ClassSet> = HashMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(class, set)| {
            let classes = match set {
                ClassSet::List(list) => list,
                ClassSet::Map(map) => map.into_keys().collect(),
            };
            (class, classes)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
