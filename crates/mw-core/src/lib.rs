//! mw-core: Shared types for Mapwire
//!
//! This crate has zero internal crate dependencies and defines the
//! plain-data types the editor engine and the CLI agree on: collection
//! type descriptors, datatype tables, step definitions and the simple
//! steps/connections persistence format.

pub mod collection_type;
pub mod datatype;
pub mod simple;
pub mod step;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::collection_type::{CollectionType, CollectionTypeError};
    pub use crate::datatype::DatatypeRegistry;
    pub use crate::simple::{ConnectionRef, Connections, Position, SimpleStep, SimpleWorkflow};
    pub use crate::step::{
        InputDefinition, InputType, OutputDefinition, PostJobAction, StepDefinition, StepError,
        StepType,
    };
}
