//! # Runtime Managers
//!
//! Query and mutation façades over the execution tree. Every operation runs inside
//! an active [`CommandContext`](crate::command::CommandContext) and goes through its
//! persistence session, so mutations stay invisible to other commands until the
//! unit of work commits.

pub mod event_subscription_manager;
pub mod execution_manager;

pub use event_subscription_manager::EventSubscriptionManager;
pub use execution_manager::ExecutionEntityManager;
