use super::event_subscription_manager::EventSubscriptionManager;
use crate::command::CommandContext;
use crate::constants::{delete_reason, events};
use crate::definition::ProcessDefinition;
use crate::error::{data_integrity, execution_not_found, invalid_argument, EngineResult};
use crate::events::EngineEvent;
use crate::models::{ExecutionEntity, HistoryRecord, NewExecution, Variables};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

/// Façade over the execution tree of running process instances
pub struct ExecutionEntityManager;

impl ExecutionEntityManager {
    pub async fn find_by_id(
        ctx: &mut CommandContext,
        execution_id: Uuid,
    ) -> EngineResult<Option<ExecutionEntity>> {
        Ok(ctx.db_session()?.find_execution(execution_id).await?)
    }

    /// Like [`Self::find_by_id`] but a missing execution is a data-integrity error
    pub async fn require(ctx: &mut CommandContext, execution_id: Uuid) -> EngineResult<ExecutionEntity> {
        Self::find_by_id(ctx, execution_id)
            .await?
            .ok_or_else(|| execution_not_found(execution_id))
    }

    pub async fn find_child_executions(
        ctx: &mut CommandContext,
        parent_id: Uuid,
    ) -> EngineResult<Vec<ExecutionEntity>> {
        Ok(ctx.db_session()?.find_child_executions(parent_id).await?)
    }

    /// Direct children of `parent_id` positioned at one of `node_ids`
    ///
    /// Ordered by creation time, then id. Executions deleted earlier in the same
    /// unit of work are not returned.
    ///
    /// # Errors
    ///
    /// An empty `node_ids` set is rejected as a usage error before any lookup.
    pub async fn find_executions_by_parent_and_node_ids(
        ctx: &mut CommandContext,
        parent_id: Uuid,
        node_ids: &HashSet<String>,
    ) -> EngineResult<Vec<ExecutionEntity>> {
        if node_ids.is_empty() {
            return Err(invalid_argument("node id set must not be empty"));
        }
        Ok(ctx
            .db_session()?
            .find_executions_by_parent_and_node_ids(parent_id, node_ids)
            .await?)
    }

    pub async fn find_by_process_instance(
        ctx: &mut CommandContext,
        process_instance_id: Uuid,
    ) -> EngineResult<Vec<ExecutionEntity>> {
        Ok(ctx
            .db_session()?
            .find_executions_by_process_instance(process_instance_id)
            .await?)
    }

    /// Create the root scope execution of a new process instance
    pub fn create_process_instance(
        ctx: &mut CommandContext,
        definition: &ProcessDefinition,
        business_key: Option<String>,
        variables: Variables,
    ) -> EngineResult<ExecutionEntity> {
        let root = ExecutionEntity::create(NewExecution {
            process_instance_id: None,
            parent_id: None,
            process_definition_id: definition.id.clone(),
            business_key,
            current_node_id: None,
            is_scope: true,
            variables,
        });
        ctx.db_session()?.insert_execution(root.clone());
        debug!(
            process_instance_id = %root.id,
            definition_id = %definition.id,
            "Created process instance"
        );
        Ok(root)
    }

    /// Create a token under `parent` positioned at `node_id`
    pub fn create_child_execution(
        ctx: &mut CommandContext,
        parent: &ExecutionEntity,
        node_id: &str,
    ) -> EngineResult<ExecutionEntity> {
        let child = ExecutionEntity::create(NewExecution {
            process_instance_id: Some(parent.process_instance_id),
            parent_id: Some(parent.id),
            process_definition_id: parent.process_definition_id.clone(),
            business_key: None,
            current_node_id: Some(node_id.to_string()),
            is_scope: false,
            variables: Variables::new(),
        });
        ctx.db_session()?.insert_execution(child.clone());
        debug!(
            execution_id = %child.id,
            parent_id = %parent.id,
            node_id,
            "Created child execution"
        );
        Ok(child)
    }

    pub fn update(ctx: &mut CommandContext, execution: ExecutionEntity) -> EngineResult<()> {
        Ok(ctx.db_session()?.update_execution(execution)?)
    }

    /// Merge a JSON object into the variables of a process instance
    pub async fn merge_process_variables(
        ctx: &mut CommandContext,
        process_instance_id: Uuid,
        payload: &Value,
    ) -> EngineResult<()> {
        if !payload.is_object() {
            return Ok(());
        }
        let mut root = Self::require(ctx, process_instance_id).await?;
        root.merge_variables(payload);
        Self::update(ctx, root)
    }

    /// Delete an execution together with its event subscriptions and write its
    /// history record
    ///
    /// Deleting an execution that is already gone is a no-op and returns
    /// `Ok(false)`. With `cascade` the whole subtree is removed, deepest first;
    /// without it, live children are a data-integrity error. So are a missing
    /// parent and a token positioned at a node its definition does not have.
    pub async fn delete_execution_and_related_data(
        ctx: &mut CommandContext,
        execution_id: Uuid,
        reason: &str,
        cascade: bool,
    ) -> EngineResult<bool> {
        let execution = {
            let session = ctx.db_session()?;
            if session.is_deleted(execution_id) {
                debug!(execution_id = %execution_id, reason, "Execution already deleted");
                return Ok(false);
            }
            match session.find_execution(execution_id).await? {
                Some(execution) => execution,
                None => {
                    debug!(execution_id = %execution_id, reason, "Execution does not exist, nothing to delete");
                    return Ok(false);
                }
            }
        };

        if let Some(parent_id) = execution.parent_id {
            let session = ctx.db_session()?;
            let parent_known =
                session.is_deleted(parent_id) || session.find_execution(parent_id).await?.is_some();
            if !parent_known {
                return Err(data_integrity(
                    format!("parent execution {parent_id} does not exist"),
                    Some(execution.id),
                    execution.current_node_id(),
                ));
            }
        }

        let mut doomed = vec![execution];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let children = Self::find_child_executions(ctx, doomed[cursor].id).await?;
            if !children.is_empty() && !cascade {
                let current = &doomed[cursor];
                return Err(data_integrity(
                    format!(
                        "execution has {} child executions and cannot be deleted without cascade",
                        children.len()
                    ),
                    Some(current.id),
                    current.current_node_id(),
                ));
            }
            doomed.extend(children);
            cursor += 1;
        }

        for entity in &doomed {
            Self::check_node(ctx, entity)?;
        }

        for (position, entity) in doomed.iter().enumerate().rev() {
            let entity_reason = if position == 0 { reason } else { delete_reason::CASCADE };
            Self::delete_single(ctx, entity, entity_reason).await?;
        }
        Ok(true)
    }

    /// The node a token sits at must exist in its definition
    fn check_node(ctx: &CommandContext, execution: &ExecutionEntity) -> EngineResult<()> {
        let Some(node_id) = execution.current_node_id() else {
            return Ok(());
        };
        let definition = ctx.definition(&execution.process_definition_id)?;
        if definition.node(node_id).is_none() {
            return Err(data_integrity(
                format!(
                    "node does not exist in process definition {}",
                    execution.process_definition_id
                ),
                Some(execution.id),
                Some(node_id),
            ));
        }
        Ok(())
    }

    async fn delete_single(
        ctx: &mut CommandContext,
        execution: &ExecutionEntity,
        reason: &str,
    ) -> EngineResult<()> {
        let removed_subscriptions =
            EventSubscriptionManager::delete_for_execution(ctx, execution.id).await?;

        let history_enabled = ctx.config().history.enabled;
        let session = ctx.db_session()?;
        if !session.delete_execution(execution.id) {
            return Ok(());
        }
        if history_enabled {
            session.record_history(HistoryRecord {
                execution_id: execution.id,
                process_instance_id: execution.process_instance_id,
                node_id: execution.current_node_id.clone(),
                delete_reason: reason.to_string(),
                is_process_instance: execution.is_process_instance(),
                ended_at: Utc::now(),
            });
        }

        ctx.queue_event(
            EngineEvent::new(events::EXECUTION_DELETED)
                .with_process_instance(execution.process_instance_id)
                .with_execution(execution.id, execution.current_node_id())
                .with_payload(json!({ "reason": reason })),
        );

        info!(
            execution_id = %execution.id,
            process_instance_id = %execution.process_instance_id,
            node_id = ?execution.current_node_id,
            reason,
            removed_subscriptions,
            "Deleted execution"
        );
        Ok(())
    }
}
