//! Transaction boundaries around a unit of work.
//!
//! A boundary is opened by the transaction interceptor for each top-level command,
//! receives the flushed change set when the context closes and is then committed
//! or rolled back exactly once.

use super::context::{CommandContext, CommandContextCloseListener};
use crate::error::{EngineError, EngineResult};
use crate::persistence::{ChangeSet, PersistenceBackend};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// Atomic unit of persistence bracketing one top-level command
#[async_trait]
pub trait TransactionBoundary: Send + Sync {
    fn id(&self) -> Uuid;

    fn state(&self) -> TransactionState;

    /// Stage changes to be written on commit
    fn enlist(&self, changes: ChangeSet) -> EngineResult<()>;

    /// Make staged changes durable. Fails if the boundary is no longer active.
    async fn commit(&self) -> EngineResult<()>;

    /// Discard staged changes. Rolling back twice is a no-op.
    async fn rollback(&self) -> EngineResult<()>;
}

/// Opens a boundary for a freshly created command context
pub trait TransactionBoundaryFactory: Send + Sync {
    fn open_transaction(&self, ctx: &CommandContext) -> EngineResult<Arc<dyn TransactionBoundary>>;
}

/// Boundary that applies its staged change set to a persistence backend on commit
pub struct BackendTransaction {
    id: Uuid,
    context_id: Uuid,
    backend: Arc<dyn PersistenceBackend>,
    state: Mutex<TransactionState>,
    staged: Mutex<ChangeSet>,
}

impl fmt::Debug for BackendTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendTransaction")
            .field("id", &self.id)
            .field("context_id", &self.context_id)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl BackendTransaction {
    pub fn new(context_id: Uuid, backend: Arc<dyn PersistenceBackend>) -> Self {
        Self {
            id: Uuid::new_v4(),
            context_id,
            backend,
            state: Mutex::new(TransactionState::Active),
            staged: Mutex::new(ChangeSet::default()),
        }
    }

    fn not_active(&self, action: &str, state: TransactionState) -> EngineError {
        EngineError::Transaction {
            message: format!("cannot {action} transaction {}: already {state}", self.id),
        }
    }
}

#[async_trait]
impl TransactionBoundary for BackendTransaction {
    fn id(&self) -> Uuid {
        self.id
    }

    fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    fn enlist(&self, changes: ChangeSet) -> EngineResult<()> {
        let state = *self.state.lock();
        if state.is_terminal() {
            return Err(self.not_active("enlist into", state));
        }
        self.staged.lock().merge(changes);
        Ok(())
    }

    async fn commit(&self) -> EngineResult<()> {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return Err(self.not_active("commit", *state));
            }
            *state = TransactionState::Committed;
        }

        let changes = std::mem::take(&mut *self.staged.lock());
        let operations = changes.len();
        if changes.is_empty() {
            debug!(transaction_id = %self.id, context_id = %self.context_id, "Committed empty transaction");
            return Ok(());
        }

        match self.backend.apply(changes).await {
            Ok(()) => {
                debug!(transaction_id = %self.id, context_id = %self.context_id, operations, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = TransactionState::RolledBack;
                warn!(transaction_id = %self.id, context_id = %self.context_id, error = %e, "Commit failed");
                Err(e.into())
            }
        }
    }

    async fn rollback(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        match *state {
            TransactionState::Active => {
                *state = TransactionState::RolledBack;
                *self.staged.lock() = ChangeSet::default();
                debug!(transaction_id = %self.id, context_id = %self.context_id, "Transaction rolled back");
                Ok(())
            }
            TransactionState::RolledBack => Ok(()),
            TransactionState::Committed => Err(self.not_active("roll back", *state)),
        }
    }
}

/// Default factory producing [`BackendTransaction`]s
#[derive(Clone)]
pub struct BackendTransactionFactory {
    backend: Arc<dyn PersistenceBackend>,
}

impl BackendTransactionFactory {
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self { backend }
    }
}

impl TransactionBoundaryFactory for BackendTransactionFactory {
    fn open_transaction(&self, ctx: &CommandContext) -> EngineResult<Arc<dyn TransactionBoundary>> {
        Ok(Arc::new(BackendTransaction::new(ctx.id(), self.backend.clone())))
    }
}

/// Ties a boundary's fate to the close of its command context
pub struct TransactionCloseListener {
    transaction: Arc<dyn TransactionBoundary>,
}

impl TransactionCloseListener {
    pub fn new(transaction: Arc<dyn TransactionBoundary>) -> Self {
        Self { transaction }
    }
}

#[async_trait]
impl CommandContextCloseListener for TransactionCloseListener {
    fn name(&self) -> &'static str {
        "TransactionCloseListener"
    }

    async fn closed(&self, ctx: &mut CommandContext) -> EngineResult<()> {
        if let Some(changes) = ctx.take_flushed_changes() {
            self.transaction.enlist(changes)?;
        }
        self.transaction.commit().await
    }

    async fn close_failure(&self, _ctx: &mut CommandContext) -> EngineResult<()> {
        self.transaction.rollback().await
    }
}
