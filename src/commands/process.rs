//! Commands that start, advance and delete process instances.

use crate::command::{Command, CommandContext};
use crate::constants::{delete_reason, events};
use crate::error::{illegal_state, invalid_argument, EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::models::Variables;
use crate::runtime::ExecutionEntityManager;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

/// Handle to a started process instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: Uuid,
    pub process_definition_id: String,
    pub business_key: Option<String>,
}

/// Which definition a new instance runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionRef {
    /// Latest deployed version of a key
    Key(String),
    /// One exact deployed version
    Id(String),
}

#[derive(Debug, Clone)]
pub struct StartProcessInstanceCmd {
    pub definition: DefinitionRef,
    pub business_key: Option<String>,
    pub variables: Variables,
}

#[async_trait]
impl Command for StartProcessInstanceCmd {
    type Output = ProcessInstance;

    fn name(&self) -> &'static str {
        "StartProcessInstanceCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<ProcessInstance> {
        let definition = match &self.definition {
            DefinitionRef::Id(id) => ctx.definition(id)?,
            DefinitionRef::Key(key) => ctx
                .services()
                .definitions
                .find_latest_by_key(key)
                .ok_or_else(|| EngineError::NotFound {
                    entity: "process definition key",
                    id: key.clone(),
                })?,
        };

        let root = ExecutionEntityManager::create_process_instance(
            ctx,
            &definition,
            self.business_key.clone(),
            self.variables.clone(),
        )?;
        let start = ExecutionEntityManager::create_child_execution(ctx, &root, &definition.start_node_id)?;
        ctx.agenda_mut().plan_continue(start.id);

        ctx.queue_event(
            EngineEvent::new(events::PROCESS_STARTED)
                .with_process_instance(root.id)
                .with_payload(json!({
                    "process_definition_id": definition.id,
                    "business_key": root.business_key,
                })),
        );
        info!(
            process_instance_id = %root.id,
            definition_id = %definition.id,
            business_key = ?root.business_key,
            "Starting process instance"
        );

        Ok(ProcessInstance {
            id: root.id,
            process_definition_id: definition.id.clone(),
            business_key: root.business_key,
        })
    }
}

/// Release a token waiting at a user task or catch event
#[derive(Debug, Clone)]
pub struct TriggerCmd {
    pub execution_id: Uuid,
    pub payload: Option<Value>,
}

#[async_trait]
impl Command for TriggerCmd {
    type Output = ();

    fn name(&self) -> &'static str {
        "TriggerCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<()> {
        if let Some(payload) = &self.payload {
            if !payload.is_object() {
                return Err(invalid_argument("trigger payload must be a JSON object"));
            }
        }
        let execution = ExecutionEntityManager::require(ctx, self.execution_id).await?;
        if execution.current_node_id.is_none() {
            return Err(illegal_state(format!(
                "execution {} is a process instance scope and cannot be triggered",
                execution.id
            )));
        }
        ctx.agenda_mut()
            .plan_trigger(execution.id, None, self.payload.clone());
        Ok(())
    }
}

/// Remove a whole process instance
#[derive(Debug, Clone)]
pub struct DeleteProcessInstanceCmd {
    pub process_instance_id: Uuid,
    pub reason: Option<String>,
}

#[async_trait]
impl Command for DeleteProcessInstanceCmd {
    type Output = bool;

    fn name(&self) -> &'static str {
        "DeleteProcessInstanceCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<bool> {
        let root = ExecutionEntityManager::require(ctx, self.process_instance_id).await?;
        if !root.is_process_instance() {
            return Err(invalid_argument(format!(
                "execution {} is not a process instance",
                root.id
            )));
        }
        let reason = self
            .reason
            .as_deref()
            .unwrap_or(delete_reason::PROCESS_INSTANCE_DELETED);
        ExecutionEntityManager::delete_execution_and_related_data(ctx, root.id, reason, true).await
    }
}
