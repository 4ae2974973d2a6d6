//! Collection type descriptors: the nesting algebra behind map-over.
//!
//! A collection type is a colon-separated path of collection kinds, outermost
//! first: `list:paired` is a list whose elements are pairs. Two sentinels sit
//! beside real paths: `Null` (a plain dataset, no collection at all) and `Any`
//! (a wildcard that matches every collection but never a plain dataset).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectionTypeError {
    #[error("malformed collection type '{0}'")]
    Malformed(String),
    #[error("cannot append to the wildcard collection type")]
    AppendToAny,
}

// ---------------------------------------------------------------------------
// CollectionType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum CollectionType {
    /// Not a collection.
    #[default]
    Null,
    /// Any collection of any depth.
    Any,
    /// A concrete path, outermost segment first. Never empty.
    Nested(Vec<String>),
}

impl CollectionType {
    /// Parse a declared collection type such as `list` or `list:paired`.
    pub fn parse(raw: &str) -> Result<Self, CollectionTypeError> {
        let segments: Vec<String> = raw.split(':').map(str::to_string).collect();
        let valid = segments.iter().all(|s| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
        if !valid {
            return Err(CollectionTypeError::Malformed(raw.to_string()));
        }
        Ok(CollectionType::Nested(segments))
    }

    /// Collection inputs without a declared type accept any collection.
    pub fn from_declared(declared: Option<&str>) -> Result<Self, CollectionTypeError> {
        match declared {
            None => Ok(CollectionType::Any),
            Some(raw) => Self::parse(raw),
        }
    }

    pub fn rank(&self) -> usize {
        match self {
            CollectionType::Nested(segments) => segments.len(),
            CollectionType::Null | CollectionType::Any => 0,
        }
    }

    pub fn is_collection(&self) -> bool {
        !matches!(self, CollectionType::Null)
    }

    /// Nest `other` inside `self`: `list` appended with `paired` is `list:paired`.
    pub fn append(&self, other: &CollectionType) -> Result<Self, CollectionTypeError> {
        match (self, other) {
            (CollectionType::Null, _) => Ok(other.clone()),
            (CollectionType::Any, _) => Err(CollectionTypeError::AppendToAny),
            (CollectionType::Nested(_), CollectionType::Null) => Ok(self.clone()),
            (CollectionType::Nested(_), CollectionType::Any) => Ok(CollectionType::Any),
            (CollectionType::Nested(outer), CollectionType::Nested(inner)) => {
                let mut segments = outer.clone();
                segments.extend(inner.iter().cloned());
                Ok(CollectionType::Nested(segments))
            }
        }
    }

    /// Whether a producer of type `other` satisfies a requirement of type `self`.
    pub fn can_match(&self, other: &CollectionType) -> bool {
        match (self, other) {
            (CollectionType::Null, _) | (_, CollectionType::Null) => false,
            (CollectionType::Any, _) | (_, CollectionType::Any) => true,
            (CollectionType::Nested(a), CollectionType::Nested(b)) => a == b,
        }
    }

    /// Whether `self` is strictly deeper than `other` and ends with it, so that
    /// iterating over the outer levels of `self` yields elements of `other`.
    pub fn can_map_over(&self, other: &CollectionType) -> bool {
        match (self, other) {
            (CollectionType::Nested(outer), CollectionType::Nested(inner)) => {
                outer.len() > inner.len() && outer.ends_with(inner)
            }
            _ => false,
        }
    }

    /// The outer levels left over once `other` is stripped off the end of `self`.
    /// `Null` when `self` cannot be mapped over `other`.
    pub fn effective_map_over(&self, other: &CollectionType) -> CollectionType {
        match (self, other) {
            (CollectionType::Nested(outer), CollectionType::Nested(inner))
                if self.can_map_over(other) =>
            {
                CollectionType::Nested(outer[..outer.len() - inner.len()].to_vec())
            }
            _ => CollectionType::Null,
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionType::Null => Ok(()),
            CollectionType::Any => f.write_str("any"),
            CollectionType::Nested(segments) => f.write_str(&segments.join(":")),
        }
    }
}

// Serialized as the optional path string: `null`, `"any"` or `"list:paired"`.

impl Serialize for CollectionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CollectionType::Null => serializer.serialize_none(),
            _ => serializer.serialize_some(&self.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for CollectionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(CollectionType::Null),
            Some(raw) if raw == "any" => Ok(CollectionType::Any),
            Some(raw) => CollectionType::parse(&raw).map_err(serde::de::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
