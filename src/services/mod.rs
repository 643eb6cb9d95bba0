//! # Engine Services
//!
//! Caller-facing entry points. Runtime, decision and history services build
//! commands and run them through the command executor; the repository service
//! manages deployments.

pub mod decision;
pub mod history;
pub mod repository;
pub mod runtime;

pub use decision::{DecisionService, ExecuteDecisionBuilder};
pub use history::HistoryService;
pub use repository::RepositoryService;
pub use runtime::{ProcessInstanceBuilder, RuntimeService};
