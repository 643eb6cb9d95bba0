//! Persistent backend trait for the execution tree.
//!
//! Implementations must apply a [`ChangeSet`] atomically and reject it when any
//! updated or deleted row was changed by someone else since it was read.

use crate::models::{DecisionHistoryRecord, EventSubscription, EventType, ExecutionEntity, HistoryRecord};
use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

/// Error type for backend operations.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Write-write conflict; the row changed or vanished since it was read.
    #[error("Concurrent modification detected for {entity} {id}")]
    Conflict { entity: &'static str, id: String },
    /// Insert of an id that already exists.
    #[error("Duplicate key for {entity} {id}")]
    DuplicateKey { entity: &'static str, id: String },
    /// Backend-specific error.
    #[error("Backend error: {0}")]
    Backend(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Row removal guarded by the revision that was read
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedRow {
    pub id: Uuid,
    pub revision: u64,
}

/// Everything one unit of work wants to write
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub inserted_executions: Vec<ExecutionEntity>,
    /// Updated rows carry the revision they were read at
    pub updated_executions: Vec<ExecutionEntity>,
    pub deleted_executions: Vec<DeletedRow>,
    pub inserted_subscriptions: Vec<EventSubscription>,
    pub deleted_subscriptions: Vec<Uuid>,
    pub history: Vec<HistoryRecord>,
    pub decision_history: Vec<DecisionHistoryRecord>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted_executions.is_empty()
            && self.updated_executions.is_empty()
            && self.deleted_executions.is_empty()
            && self.inserted_subscriptions.is_empty()
            && self.deleted_subscriptions.is_empty()
            && self.history.is_empty()
            && self.decision_history.is_empty()
    }

    /// Append another change set, preserving order
    pub fn merge(&mut self, other: ChangeSet) {
        self.inserted_executions.extend(other.inserted_executions);
        self.updated_executions.extend(other.updated_executions);
        self.deleted_executions.extend(other.deleted_executions);
        self.inserted_subscriptions.extend(other.inserted_subscriptions);
        self.deleted_subscriptions.extend(other.deleted_subscriptions);
        self.history.extend(other.history);
        self.decision_history.extend(other.decision_history);
    }

    /// Number of row operations, for logging
    pub fn len(&self) -> usize {
        self.inserted_executions.len()
            + self.updated_executions.len()
            + self.deleted_executions.len()
            + self.inserted_subscriptions.len()
            + self.deleted_subscriptions.len()
            + self.history.len()
            + self.decision_history.len()
    }
}

/// Trait for durable storage of the execution tree.
///
/// Queries never fail for "not found"; they return `None` or an empty vector.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Point lookup by id.
    async fn find_execution(&self, id: Uuid) -> PersistenceResult<Option<ExecutionEntity>>;

    /// Direct children of `parent_id`.
    async fn find_child_executions(&self, parent_id: Uuid)
        -> PersistenceResult<Vec<ExecutionEntity>>;

    /// Direct children of `parent_id` positioned at one of `node_ids`.
    async fn find_executions_by_parent_and_node_ids(
        &self,
        parent_id: Uuid,
        node_ids: &HashSet<String>,
    ) -> PersistenceResult<Vec<ExecutionEntity>>;

    /// Every execution of one process instance, root included.
    async fn find_executions_by_process_instance(
        &self,
        process_instance_id: Uuid,
    ) -> PersistenceResult<Vec<ExecutionEntity>>;

    async fn find_event_subscriptions_by_execution(
        &self,
        execution_id: Uuid,
    ) -> PersistenceResult<Vec<EventSubscription>>;

    async fn find_event_subscriptions_by_event(
        &self,
        event_type: EventType,
        event_name: &str,
    ) -> PersistenceResult<Vec<EventSubscription>>;

    async fn find_history(&self, process_instance_id: Uuid)
        -> PersistenceResult<Vec<HistoryRecord>>;

    /// Decision audit trails recorded for a process instance, oldest first.
    async fn find_decision_history(
        &self,
        process_instance_id: Uuid,
    ) -> PersistenceResult<Vec<DecisionHistoryRecord>>;

    /// Apply a change set atomically.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Conflict` if an updated or deleted row no longer
    /// matches the revision it was read at. Nothing is written in that case.
    async fn apply(&self, changes: ChangeSet) -> PersistenceResult<()>;
}
