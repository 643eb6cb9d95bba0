//! Unit-of-work session over a persistence backend.
//!
//! A [`DbSession`] lives inside one command context. It keeps an identity map of
//! every execution it has read or written, so lookups inside the same command see
//! its own pending changes, and turns those changes into a single [`ChangeSet`]
//! when the context flushes.

use super::backend::{ChangeSet, DeletedRow, PersistenceBackend, PersistenceError, PersistenceResult};
use crate::command::Session;
use crate::error::EngineResult;
use crate::models::{
    DecisionHistoryRecord, EventSubscription, EventType, ExecutionEntity, HistoryRecord,
};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityState {
    /// Read from the backend at the stored revision
    Loaded { dirty: bool },
    Inserted,
    /// `revision` is `None` when the row never reached the backend
    Deleted { revision: Option<u64> },
}

#[derive(Debug, Clone)]
struct Cached {
    entity: ExecutionEntity,
    state: EntityState,
}

/// Per-command cache and write buffer
pub struct DbSession {
    backend: Arc<dyn PersistenceBackend>,
    executions: HashMap<Uuid, Cached>,
    /// Subscriptions seen through queries, keyed by id
    subscriptions: HashMap<Uuid, EventSubscription>,
    inserted_subscriptions: Vec<Uuid>,
    deleted_subscriptions: HashSet<Uuid>,
    history: Vec<HistoryRecord>,
    decision_history: Vec<DecisionHistoryRecord>,
}

impl std::fmt::Debug for DbSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSession")
            .field("cached_executions", &self.executions.len())
            .field("inserted_subscriptions", &self.inserted_subscriptions.len())
            .field("deleted_subscriptions", &self.deleted_subscriptions.len())
            .field("history", &self.history.len())
            .field("decision_history", &self.decision_history.len())
            .finish()
    }
}

impl DbSession {
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self {
            backend,
            executions: HashMap::new(),
            subscriptions: HashMap::new(),
            inserted_subscriptions: Vec::new(),
            deleted_subscriptions: HashSet::new(),
            history: Vec::new(),
            decision_history: Vec::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn PersistenceBackend> {
        &self.backend
    }

    /// Look up an execution, honoring changes made earlier in this session
    pub async fn find_execution(&mut self, id: Uuid) -> PersistenceResult<Option<ExecutionEntity>> {
        if let Some(cached) = self.executions.get(&id) {
            return Ok(match cached.state {
                EntityState::Deleted { .. } => None,
                _ => Some(cached.entity.clone()),
            });
        }

        let loaded = self.backend.find_execution(id).await?;
        if let Some(entity) = &loaded {
            self.cache_loaded(entity.clone());
        }
        Ok(loaded)
    }

    /// Whether the execution was removed earlier in this session
    pub fn is_deleted(&self, id: Uuid) -> bool {
        matches!(
            self.executions.get(&id).map(|c| c.state),
            Some(EntityState::Deleted { .. })
        )
    }

    /// Direct children of `parent_id` as this session sees them
    pub async fn find_child_executions(
        &mut self,
        parent_id: Uuid,
    ) -> PersistenceResult<Vec<ExecutionEntity>> {
        let stored = self.backend.find_child_executions(parent_id).await?;
        self.merge_query(stored, |e| e.parent_id == Some(parent_id))
    }

    /// Children of `parent_id` positioned at one of `node_ids`, as this session sees them
    pub async fn find_executions_by_parent_and_node_ids(
        &mut self,
        parent_id: Uuid,
        node_ids: &HashSet<String>,
    ) -> PersistenceResult<Vec<ExecutionEntity>> {
        let stored = self
            .backend
            .find_executions_by_parent_and_node_ids(parent_id, node_ids)
            .await?;
        self.merge_query(stored, |e| {
            e.parent_id == Some(parent_id) && e.is_at_any(node_ids)
        })
    }

    pub async fn find_executions_by_process_instance(
        &mut self,
        process_instance_id: Uuid,
    ) -> PersistenceResult<Vec<ExecutionEntity>> {
        let stored = self
            .backend
            .find_executions_by_process_instance(process_instance_id)
            .await?;
        self.merge_query(stored, |e| e.process_instance_id == process_instance_id)
    }

    /// Stored rows already cached are replaced by their session version, then
    /// session-only matches are added. Deleted rows never appear.
    fn merge_query(
        &mut self,
        stored: Vec<ExecutionEntity>,
        matches: impl Fn(&ExecutionEntity) -> bool,
    ) -> PersistenceResult<Vec<ExecutionEntity>> {
        for entity in stored {
            if !self.executions.contains_key(&entity.id) {
                self.cache_loaded(entity);
            }
        }

        let mut result: Vec<ExecutionEntity> = self
            .executions
            .values()
            .filter(|c| !matches!(c.state, EntityState::Deleted { .. }))
            .map(|c| &c.entity)
            .filter(|e| matches(e))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    fn cache_loaded(&mut self, entity: ExecutionEntity) {
        self.executions.insert(
            entity.id,
            Cached {
                entity,
                state: EntityState::Loaded { dirty: false },
            },
        );
    }

    pub fn insert_execution(&mut self, entity: ExecutionEntity) {
        self.executions.insert(
            entity.id,
            Cached {
                entity,
                state: EntityState::Inserted,
            },
        );
    }

    /// Replace the cached version of an execution read or inserted in this session
    pub fn update_execution(&mut self, entity: ExecutionEntity) -> PersistenceResult<()> {
        let cached = self
            .executions
            .get_mut(&entity.id)
            .ok_or_else(|| PersistenceError::Backend(format!(
                "execution {} was updated without being loaded",
                entity.id
            )))?;

        match cached.state {
            EntityState::Deleted { .. } => Err(PersistenceError::Conflict {
                entity: "execution",
                id: entity.id.to_string(),
            }),
            EntityState::Inserted => {
                cached.entity = entity;
                Ok(())
            }
            EntityState::Loaded { .. } => {
                // Keep the revision that was read so the backend can detect conflicts
                let revision = cached.entity.revision;
                cached.entity = ExecutionEntity { revision, ..entity };
                cached.state = EntityState::Loaded { dirty: true };
                Ok(())
            }
        }
    }

    /// Mark an execution deleted. Returns false if it was already deleted or unknown.
    pub fn delete_execution(&mut self, id: Uuid) -> bool {
        match self.executions.get_mut(&id) {
            Some(cached) => match cached.state {
                EntityState::Deleted { .. } => false,
                EntityState::Inserted => {
                    cached.state = EntityState::Deleted { revision: None };
                    true
                }
                EntityState::Loaded { .. } => {
                    cached.state = EntityState::Deleted {
                        revision: Some(cached.entity.revision),
                    };
                    true
                }
            },
            None => false,
        }
    }

    pub fn insert_subscription(&mut self, subscription: EventSubscription) {
        self.inserted_subscriptions.push(subscription.id);
        self.subscriptions.insert(subscription.id, subscription);
    }

    /// Live subscriptions owned by an execution
    pub async fn find_subscriptions_by_execution(
        &mut self,
        execution_id: Uuid,
    ) -> PersistenceResult<Vec<EventSubscription>> {
        let stored = self
            .backend
            .find_event_subscriptions_by_execution(execution_id)
            .await?;
        Ok(self.merge_subscriptions(stored, |s| s.execution_id == execution_id))
    }

    /// Live subscriptions waiting for a named event
    pub async fn find_subscriptions_by_event(
        &mut self,
        event_type: EventType,
        event_name: &str,
    ) -> PersistenceResult<Vec<EventSubscription>> {
        let stored = self
            .backend
            .find_event_subscriptions_by_event(event_type, event_name)
            .await?;
        Ok(self.merge_subscriptions(stored, |s| {
            s.event_type == event_type && s.event_name == event_name
        }))
    }

    fn merge_subscriptions(
        &mut self,
        stored: Vec<EventSubscription>,
        matches: impl Fn(&EventSubscription) -> bool,
    ) -> Vec<EventSubscription> {
        for subscription in stored {
            self.subscriptions.entry(subscription.id).or_insert(subscription);
        }
        let mut result: Vec<EventSubscription> = self
            .subscriptions
            .values()
            .filter(|s| !self.deleted_subscriptions.contains(&s.id) && matches(s))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        result
    }

    pub fn delete_subscription(&mut self, id: Uuid) {
        self.deleted_subscriptions.insert(id);
    }

    pub fn record_history(&mut self, record: HistoryRecord) {
        self.history.push(record);
    }

    pub fn record_decision(&mut self, record: DecisionHistoryRecord) {
        self.decision_history.push(record);
    }

    /// Drain buffered writes into a change set
    pub fn take_changes(&mut self) -> ChangeSet {
        let mut changes = ChangeSet::default();

        let mut cached: Vec<Cached> = self.executions.drain().map(|(_, c)| c).collect();
        cached.sort_by(|a, b| {
            a.entity
                .created_at
                .cmp(&b.entity.created_at)
                .then(a.entity.id.cmp(&b.entity.id))
        });
        for Cached { entity, state } in cached {
            match state {
                EntityState::Inserted => changes.inserted_executions.push(entity),
                EntityState::Loaded { dirty: true } => changes.updated_executions.push(entity),
                EntityState::Loaded { dirty: false } => {}
                EntityState::Deleted { revision: Some(revision) } => {
                    changes.deleted_executions.push(DeletedRow {
                        id: entity.id,
                        revision,
                    })
                }
                EntityState::Deleted { revision: None } => {}
            }
        }

        for id in self.inserted_subscriptions.drain(..) {
            if self.deleted_subscriptions.remove(&id) {
                continue;
            }
            if let Some(subscription) = self.subscriptions.get(&id) {
                changes.inserted_subscriptions.push(subscription.clone());
            }
        }
        changes.deleted_subscriptions = self.deleted_subscriptions.drain().collect();
        changes.deleted_subscriptions.sort();
        changes.history = std::mem::take(&mut self.history);
        changes.decision_history = std::mem::take(&mut self.decision_history);
        self.subscriptions.clear();

        changes
    }
}

impl Session for DbSession {
    fn flush(&mut self, changes: &mut ChangeSet) -> EngineResult<()> {
        changes.merge(self.take_changes());
        Ok(())
    }

    fn close(&mut self) {
        self.executions.clear();
        self.subscriptions.clear();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
