//! # Engine Events
//!
//! Lifecycle notifications published on a broadcast channel once the unit of work
//! that produced them has committed.

pub mod publisher;

pub use publisher::{EngineEvent, EventPublisher};
