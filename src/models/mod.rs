//! Persistent entities of the execution tree.

pub mod event_subscription;
pub mod execution;
pub mod history;

pub use event_subscription::{EventSubscription, EventType};
pub use execution::{ExecutionEntity, NewExecution, Variables};
pub use history::{DecisionHistoryRecord, HistoryRecord};
