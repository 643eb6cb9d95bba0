#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Process Engine
//!
//! Execution core of a process-orchestration runtime: running process instances
//! are persistent trees of execution tokens advanced by commands.
//!
//! ## Overview
//!
//! Every unit of work is a [`Command`](command::Command) passed through an ordered
//! interceptor chain (logging, retry, command context, transaction boundary,
//! invoker). Nested commands join the active command context so a command built
//! from sub-commands commits or rolls back as one unit, decided only by the
//! outermost invocation.
//!
//! Token movement is planned on the context's agenda and carried out by per-node
//! [`behavior`]s. Event-based gateways resolve races between waiting branches by
//! cancelling the losers inside the winner's unit of work.
//!
//! ## Module Organization
//!
//! - [`command`] - Command trait, interceptor chain, command context, transactions
//! - [`operations`] - Agenda interpreter moving tokens along the graph
//! - [`behavior`] - Per-node-kind execute/trigger/leave/cancel logic
//! - [`runtime`] - Execution tree and event subscription managers
//! - [`persistence`] - Backend trait, in-memory backend, unit-of-work session
//! - [`definition`] - Process graphs, builder and deployment repository
//! - [`decision`] - Rule-table decisions with audit trail
//! - [`commands`] / [`services`] - Caller-facing operations
//! - [`engine`] - Bootstrap tying everything together
//!
//! ## Quick Start
//!
//! ```rust
//! use process_engine::definition::ProcessDefinitionBuilder;
//! use process_engine::engine::ProcessEngine;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ProcessEngine::builder().build()?;
//! engine.repository_service().deploy(
//!     ProcessDefinitionBuilder::new("approval")
//!         .start_event("start")
//!         .user_task("review")
//!         .end_event("end")
//!         .flow("start", "review")
//!         .flow("review", "end")
//!         .build()?,
//! )?;
//!
//! let runtime = engine.runtime_service();
//! let instance = runtime
//!     .create_process_instance_builder()
//!     .process_definition_key("approval")
//!     .variable("amount", 420)
//!     .start()
//!     .await?;
//! assert_eq!(runtime.find_executions(instance.id).await?.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod behavior;
pub mod command;
pub mod commands;
pub mod config;
pub mod constants;
pub mod decision;
pub mod definition;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod operations;
pub mod persistence;
pub mod runtime;
pub mod services;

pub use command::{Command, CommandConfig, CommandContext, CommandExecutor};
pub use config::{ConfigManager, EngineConfig};
pub use engine::{EngineServices, ProcessEngine, ProcessEngineBuilder};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use models::{ExecutionEntity, Variables};
