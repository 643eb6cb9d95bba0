//! # Process Definitions
//!
//! Immutable process graphs: nodes tagged with a [`NodeKind`], connected by
//! [`SequenceFlow`]s. Definitions are built with [`ProcessDefinitionBuilder`],
//! validated, and served to running instances through a [`DefinitionProvider`].

pub mod builder;
pub mod model;
pub mod repository;

pub use builder::ProcessDefinitionBuilder;
pub use model::{CatchTrigger, FlowCondition, FlowNode, NodeKind, ProcessDefinition, SequenceFlow};
pub use repository::{DefinitionProvider, DefinitionRepository};
