//! The unit-of-work context shared by a top-level command and every command
//! nested inside it.

use super::agenda::Agenda;
use super::executor::CommandExecutor;
use super::transaction::TransactionBoundary;
use super::{Command, CommandConfig};
use crate::config::EngineConfig;
use crate::definition::ProcessDefinition;
use crate::engine::EngineServices;
use crate::error::{illegal_state, EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::models::DecisionHistoryRecord;
use crate::persistence::{ChangeSet, DbSession};
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Resource opened lazily inside a command context and flushed when it closes
pub trait Session: Any + Send {
    /// Contribute buffered writes to the unit of work's change set
    fn flush(&mut self, changes: &mut ChangeSet) -> EngineResult<()>;

    /// Release resources; called last, on success and failure alike
    fn close(&mut self) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Callbacks around the close of a command context
///
/// On success the phases run in order `closing`, `after_session_flushed`, `closed`.
/// On failure only `close_failure` runs.
#[async_trait]
pub trait CommandContextCloseListener: Send + Sync {
    fn name(&self) -> &'static str;

    async fn closing(&self, _ctx: &mut CommandContext) -> EngineResult<()> {
        Ok(())
    }

    async fn after_session_flushed(&self, _ctx: &mut CommandContext) -> EngineResult<()> {
        Ok(())
    }

    async fn closed(&self, _ctx: &mut CommandContext) -> EngineResult<()> {
        Ok(())
    }

    async fn close_failure(&self, _ctx: &mut CommandContext) -> EngineResult<()> {
        Ok(())
    }
}

/// Per-invocation unit of work
///
/// Created by the context interceptor for a top-level command and reused by every
/// nested command. Owns the sessions, the agenda, the attached transaction boundary
/// and the engine events waiting for commit.
pub struct CommandContext {
    id: Uuid,
    services: Arc<EngineServices>,
    executor: CommandExecutor,
    nesting_depth: usize,
    attempt: u32,
    sessions: HashMap<TypeId, Box<dyn Session>>,
    close_listeners: Vec<Box<dyn CommandContextCloseListener>>,
    transaction: Option<Arc<dyn TransactionBoundary>>,
    agenda: Agenda,
    pending_events: Vec<EngineEvent>,
    flushed_changes: Option<ChangeSet>,
    nested_failure: Option<String>,
    /// Written on their own when the context closes, whatever the outcome
    failed_decisions: Vec<DecisionHistoryRecord>,
    started_at: Instant,
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("id", &self.id)
            .field("nesting_depth", &self.nesting_depth)
            .field("attempt", &self.attempt)
            .field("sessions", &self.sessions.len())
            .field("close_listeners", &self.close_listeners.len())
            .field("has_transaction", &self.transaction.is_some())
            .field("agenda", &self.agenda.len())
            .finish()
    }
}

impl CommandContext {
    pub(crate) fn new(services: Arc<EngineServices>, executor: CommandExecutor, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            services,
            executor,
            nesting_depth: 0,
            attempt,
            sessions: HashMap::new(),
            close_listeners: Vec::new(),
            transaction: None,
            agenda: Agenda::new(),
            pending_events: Vec::new(),
            flushed_changes: None,
            nested_failure: None,
            failed_decisions: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn services(&self) -> &Arc<EngineServices> {
        &self.services
    }

    pub fn config(&self) -> &EngineConfig {
        &self.services.config
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Attempt number of the top-level command, starting at 1
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the running invocation joined this context instead of creating it
    pub fn is_reused(&self) -> bool {
        self.nesting_depth > 0
    }

    pub fn nesting_depth(&self) -> usize {
        self.nesting_depth
    }

    pub(crate) fn enter_nested(&mut self) {
        self.nesting_depth += 1;
    }

    pub(crate) fn exit_nested(&mut self) {
        self.nesting_depth = self.nesting_depth.saturating_sub(1);
    }

    /// Remember that a nested invocation failed; the unit of work will roll back
    pub(crate) fn mark_nested_failure(&mut self, error: &EngineError) {
        if self.nested_failure.is_none() {
            self.nested_failure = Some(error.to_string());
        }
    }

    pub fn add_close_listener(&mut self, listener: Box<dyn CommandContextCloseListener>) {
        self.close_listeners.push(listener);
    }

    pub fn close_listener_count(&self) -> usize {
        self.close_listeners.len()
    }

    pub fn transaction(&self) -> Option<&Arc<dyn TransactionBoundary>> {
        self.transaction.as_ref()
    }

    /// Attach the transaction boundary; a context carries at most one
    pub fn set_transaction(&mut self, transaction: Arc<dyn TransactionBoundary>) -> EngineResult<()> {
        if let Some(existing) = &self.transaction {
            return Err(illegal_state(format!(
                "command context {} already has transaction {} attached",
                self.id,
                existing.id()
            )));
        }
        self.transaction = Some(transaction);
        Ok(())
    }

    pub fn clear_transaction(&mut self) -> Option<Arc<dyn TransactionBoundary>> {
        self.transaction.take()
    }

    /// Session of type `S`, opened on first use
    pub fn session<S, F>(&mut self, open: F) -> EngineResult<&mut S>
    where
        S: Session,
        F: FnOnce(&Arc<EngineServices>) -> S,
    {
        let services = &self.services;
        let session = self
            .sessions
            .entry(TypeId::of::<S>())
            .or_insert_with(|| Box::new(open(services)));
        session
            .as_any_mut()
            .downcast_mut::<S>()
            .ok_or_else(|| EngineError::Internal("session registered under a foreign type id".to_string()))
    }

    /// The persistence session of this unit of work
    pub fn db_session(&mut self) -> EngineResult<&mut DbSession> {
        self.session(|services| DbSession::new(services.backend.clone()))
    }

    pub fn agenda(&self) -> &Agenda {
        &self.agenda
    }

    pub fn agenda_mut(&mut self) -> &mut Agenda {
        &mut self.agenda
    }

    /// Queue an engine event; published only if the unit of work commits
    pub fn queue_event(&mut self, event: EngineEvent) {
        self.pending_events.push(event);
    }

    /// Keep the audit of a failed mandatory decision past a rollback
    pub fn record_decision_failure(&mut self, record: DecisionHistoryRecord) {
        self.failed_decisions.push(record);
    }

    pub fn pending_event_count(&self) -> usize {
        self.pending_events.len()
    }

    /// Changes flushed from the sessions during close, for whoever persists them
    pub fn take_flushed_changes(&mut self) -> Option<ChangeSet> {
        self.flushed_changes.take()
    }

    /// Resolve a deployed process definition by id
    pub fn definition(&self, definition_id: &str) -> EngineResult<Arc<ProcessDefinition>> {
        self.services
            .definitions
            .find_by_id(definition_id)
            .ok_or_else(|| EngineError::NotFound {
                entity: "process definition",
                id: definition_id.to_string(),
            })
    }

    /// Run another command inside this unit of work
    pub async fn execute_nested<C>(&mut self, command: C) -> EngineResult<C::Output>
    where
        C: Command + 'static,
    {
        let executor = self.executor.clone();
        let config = executor.default_config().clone();
        executor.execute_in_context(self, &config, command).await
    }

    pub async fn execute_nested_with_config<C>(
        &mut self,
        config: &CommandConfig,
        command: C,
    ) -> EngineResult<C::Output>
    where
        C: Command + 'static,
    {
        let executor = self.executor.clone();
        executor.execute_in_context(self, config, command).await
    }

    /// Close the unit of work
    ///
    /// `failure` is the error the outermost invocation produced, if any. A close
    /// error on the success path (a failed commit, say) becomes the invocation's
    /// result and the failure listeners still run.
    pub(crate) async fn close(mut self, failure: Option<&EngineError>) -> EngineResult<()> {
        let listeners = std::mem::take(&mut self.close_listeners);
        let nested_failure = self.nested_failure.take();
        let failed = failure.is_some() || nested_failure.is_some();

        let mut outcome = if failed {
            Ok(())
        } else {
            self.close_successfully(&listeners).await
        };

        if failed || outcome.is_err() {
            self.agenda.clear();
            self.pending_events.clear();
            self.flushed_changes = None;
            for listener in &listeners {
                if let Err(e) = listener.close_failure(&mut self).await {
                    warn!(
                        context_id = %self.id,
                        listener = listener.name(),
                        error = %e,
                        "Close-failure listener failed"
                    );
                }
            }
        }

        if failure.is_none() && outcome.is_ok() {
            if let Some(message) = nested_failure {
                outcome = Err(EngineError::Transaction {
                    message: format!("nested command failed, unit of work rolled back: {message}"),
                });
            }
        }

        for session in self.sessions.values_mut() {
            session.close();
        }

        if !self.failed_decisions.is_empty() {
            let records = std::mem::take(&mut self.failed_decisions);
            let count = records.len();
            let changes = ChangeSet {
                decision_history: records,
                ..ChangeSet::default()
            };
            if let Err(e) = self.services.backend.apply(changes).await {
                warn!(
                    context_id = %self.id,
                    records = count,
                    error = %e,
                    "Failed to record decision failures"
                );
            }
        }

        let elapsed_ms = self.started_at.elapsed().as_millis() as u64;
        if failure.is_none() && outcome.is_ok() {
            let published = self.pending_events.len();
            for event in self.pending_events.drain(..) {
                self.services.events.publish(event);
            }
            debug!(context_id = %self.id, elapsed_ms, published, "Command context closed");
        } else {
            debug!(context_id = %self.id, elapsed_ms, "Command context closed after failure");
        }

        outcome
    }

    async fn close_successfully(
        &mut self,
        listeners: &[Box<dyn CommandContextCloseListener>],
    ) -> EngineResult<()> {
        for listener in listeners {
            listener.closing(self).await?;
        }

        let mut changes = ChangeSet::default();
        for session in self.sessions.values_mut() {
            session.flush(&mut changes)?;
        }
        debug!(context_id = %self.id, operations = changes.len(), "Sessions flushed");
        self.flushed_changes = Some(changes);

        for listener in listeners {
            listener.after_session_flushed(self).await?;
        }
        for listener in listeners {
            listener.closed(self).await?;
        }

        // Without a transaction boundary nobody took the changes
        if let Some(changes) = self.flushed_changes.take() {
            if !changes.is_empty() {
                self.services.backend.apply(changes).await?;
            }
        }
        Ok(())
    }
}
