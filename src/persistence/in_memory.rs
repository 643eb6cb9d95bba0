//! In-memory implementation of PersistenceBackend.
//!
//! Stores executions, subscriptions and history behind one lock so a change set is
//! validated and applied atomically. Useful for tests and embedded use.

use super::backend::{ChangeSet, PersistenceBackend, PersistenceError, PersistenceResult};
use crate::models::{
    DecisionHistoryRecord, EventSubscription, EventType, ExecutionEntity, HistoryRecord,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Store {
    executions: HashMap<Uuid, ExecutionEntity>,
    subscriptions: HashMap<Uuid, EventSubscription>,
    history: Vec<HistoryRecord>,
    decision_history: Vec<DecisionHistoryRecord>,
    applied_change_sets: u64,
}

/// In-memory backend with revision-checked writes.
///
/// # Example
///
/// ```rust
/// use process_engine::persistence::InMemoryBackend;
///
/// let backend = InMemoryBackend::new();
/// assert_eq!(backend.execution_count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<RwLock<Store>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored executions
    pub fn execution_count(&self) -> usize {
        self.store.read().executions.len()
    }

    /// Number of change sets applied so far
    pub fn applied_change_sets(&self) -> u64 {
        self.store.read().applied_change_sets
    }

    fn sorted(mut executions: Vec<ExecutionEntity>) -> Vec<ExecutionEntity> {
        executions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        executions
    }

    fn validate(store: &Store, changes: &ChangeSet) -> PersistenceResult<()> {
        for entity in &changes.inserted_executions {
            if store.executions.contains_key(&entity.id) {
                return Err(PersistenceError::DuplicateKey {
                    entity: "execution",
                    id: entity.id.to_string(),
                });
            }
        }

        let updated = changes
            .updated_executions
            .iter()
            .map(|e| (e.id, e.revision));
        let deleted = changes.deleted_executions.iter().map(|d| (d.id, d.revision));
        for (id, revision) in updated.chain(deleted) {
            match store.executions.get(&id) {
                Some(current) if current.revision == revision => {}
                _ => {
                    return Err(PersistenceError::Conflict {
                        entity: "execution",
                        id: id.to_string(),
                    })
                }
            }
        }

        for subscription in &changes.inserted_subscriptions {
            if store.subscriptions.contains_key(&subscription.id) {
                return Err(PersistenceError::DuplicateKey {
                    entity: "event_subscription",
                    id: subscription.id.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceBackend for InMemoryBackend {
    async fn find_execution(&self, id: Uuid) -> PersistenceResult<Option<ExecutionEntity>> {
        Ok(self.store.read().executions.get(&id).cloned())
    }

    async fn find_child_executions(
        &self,
        parent_id: Uuid,
    ) -> PersistenceResult<Vec<ExecutionEntity>> {
        let store = self.store.read();
        let children = store
            .executions
            .values()
            .filter(|e| e.parent_id == Some(parent_id))
            .cloned()
            .collect();
        Ok(Self::sorted(children))
    }

    async fn find_executions_by_parent_and_node_ids(
        &self,
        parent_id: Uuid,
        node_ids: &HashSet<String>,
    ) -> PersistenceResult<Vec<ExecutionEntity>> {
        let store = self.store.read();
        let matches = store
            .executions
            .values()
            .filter(|e| e.parent_id == Some(parent_id) && e.is_at_any(node_ids))
            .cloned()
            .collect();
        Ok(Self::sorted(matches))
    }

    async fn find_executions_by_process_instance(
        &self,
        process_instance_id: Uuid,
    ) -> PersistenceResult<Vec<ExecutionEntity>> {
        let store = self.store.read();
        let executions = store
            .executions
            .values()
            .filter(|e| e.process_instance_id == process_instance_id)
            .cloned()
            .collect();
        Ok(Self::sorted(executions))
    }

    async fn find_event_subscriptions_by_execution(
        &self,
        execution_id: Uuid,
    ) -> PersistenceResult<Vec<EventSubscription>> {
        let store = self.store.read();
        let mut subscriptions: Vec<_> = store
            .subscriptions
            .values()
            .filter(|s| s.execution_id == execution_id)
            .cloned()
            .collect();
        subscriptions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(subscriptions)
    }

    async fn find_event_subscriptions_by_event(
        &self,
        event_type: EventType,
        event_name: &str,
    ) -> PersistenceResult<Vec<EventSubscription>> {
        let store = self.store.read();
        let mut subscriptions: Vec<_> = store
            .subscriptions
            .values()
            .filter(|s| s.event_type == event_type && s.event_name == event_name)
            .cloned()
            .collect();
        subscriptions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(subscriptions)
    }

    async fn find_history(
        &self,
        process_instance_id: Uuid,
    ) -> PersistenceResult<Vec<HistoryRecord>> {
        let store = self.store.read();
        Ok(store
            .history
            .iter()
            .filter(|h| h.process_instance_id == process_instance_id)
            .cloned()
            .collect())
    }

    async fn find_decision_history(
        &self,
        process_instance_id: Uuid,
    ) -> PersistenceResult<Vec<DecisionHistoryRecord>> {
        let store = self.store.read();
        Ok(store
            .decision_history
            .iter()
            .filter(|d| d.process_instance_id == process_instance_id)
            .cloned()
            .collect())
    }

    async fn apply(&self, changes: ChangeSet) -> PersistenceResult<()> {
        let mut store = self.store.write();
        Self::validate(&store, &changes)?;

        let operations = changes.len();
        for entity in changes.inserted_executions {
            store.executions.insert(entity.id, entity);
        }
        for mut entity in changes.updated_executions {
            entity.revision += 1;
            store.executions.insert(entity.id, entity);
        }
        for row in changes.deleted_executions {
            store.executions.remove(&row.id);
        }
        for subscription in changes.inserted_subscriptions {
            store.subscriptions.insert(subscription.id, subscription);
        }
        for id in changes.deleted_subscriptions {
            store.subscriptions.remove(&id);
        }
        store.history.extend(changes.history);
        store.decision_history.extend(changes.decision_history);
        store.applied_change_sets += 1;

        debug!(operations, "Applied change set");
        Ok(())
    }
}
