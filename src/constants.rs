//! # Engine Constants
//!
//! Audit reasons and event names shared across the execution tree.

/// Reasons recorded when an execution is removed
pub mod delete_reason {
    pub const EVENT_BASED_GATEWAY_CANCEL: &str = "event-based-gateway-cancel";
    pub const ACTIVITY_END: &str = "activity-end";
    pub const PARALLEL_GATEWAY_JOIN: &str = "parallel-gateway-join";
    pub const PROCESS_INSTANCE_ENDED: &str = "process-instance-ended";
    pub const PROCESS_INSTANCE_DELETED: &str = "process-instance-deleted";
    pub const CASCADE: &str = "cascade";
}

/// Engine event names published after commit
pub mod events {
    pub const EXECUTION_DELETED: &str = "execution.deleted";
    pub const PROCESS_STARTED: &str = "process.started";
    pub const PROCESS_COMPLETED: &str = "process.completed";
    pub const DECISION_EVALUATED: &str = "decision.evaluated";
}
