//! # Command Pipeline
//!
//! Every externally-triggered operation is a [`Command`] run through an ordered
//! chain of [`CommandInterceptor`]s. The chain establishes the [`CommandContext`]
//! (the unit of work), optionally wraps it in a [`TransactionBoundary`], and finally
//! invokes the command and drains its agenda.
//!
//! Nested commands issued from inside a running command reuse the active context
//! and never open a second transaction.

pub mod agenda;
pub mod context;
pub mod executor;
pub mod interceptors;
pub mod transaction;

use crate::error::EngineResult;
use async_trait::async_trait;
use std::any::Any;

pub use agenda::{Agenda, AgendaOperation};
pub use context::{CommandContext, CommandContextCloseListener, Session};
pub use executor::{CommandExecutor, CommandInterceptor, Invocation, Next};
pub use transaction::{
    BackendTransaction, BackendTransactionFactory, TransactionBoundary,
    TransactionBoundaryFactory, TransactionCloseListener, TransactionState,
};

/// Type-erased command result travelling through the interceptor chain
pub type BoxedOutput = Box<dyn Any + Send>;

/// A unit of work executed inside a command context
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use process_engine::command::{Command, CommandContext};
/// use process_engine::error::EngineResult;
///
/// struct Ping;
///
/// #[async_trait]
/// impl Command for Ping {
///     type Output = &'static str;
///
///     fn name(&self) -> &'static str {
///         "Ping"
///     }
///
///     async fn execute(&self, _ctx: &mut CommandContext) -> EngineResult<Self::Output> {
///         Ok("pong")
///     }
/// }
/// ```
#[async_trait]
pub trait Command: Send + Sync {
    type Output: Send + 'static;

    /// Name used in logs and spans
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<Self::Output>;
}

/// Object-safe view of a [`Command`] used by interceptors
#[async_trait]
pub trait ErasedCommand: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute_boxed(&self, ctx: &mut CommandContext) -> EngineResult<BoxedOutput>;
}

#[async_trait]
impl<C> ErasedCommand for C
where
    C: Command,
{
    fn name(&self) -> &'static str {
        Command::name(self)
    }

    async fn execute_boxed(&self, ctx: &mut CommandContext) -> EngineResult<BoxedOutput> {
        let output = self.execute(ctx).await?;
        Ok(Box::new(output))
    }
}

/// Per-invocation pipeline settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandConfig {
    /// Join an already active context instead of refusing to run nested
    pub context_reuse_possible: bool,
    /// Let the retry interceptor re-run the command on conflicts
    pub retry_enabled: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            context_reuse_possible: true,
            retry_enabled: true,
        }
    }
}

impl CommandConfig {
    pub fn from_settings(settings: &crate::config::CommandSettings) -> Self {
        Self {
            context_reuse_possible: settings.context_reuse_possible,
            retry_enabled: true,
        }
    }

    pub fn with_context_reuse(mut self, possible: bool) -> Self {
        self.context_reuse_possible = possible;
        self
    }

    pub fn without_retries(mut self) -> Self {
        self.retry_enabled = false;
        self
    }
}
