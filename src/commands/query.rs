//! Read-only commands over the execution tree and its history.

use crate::command::{Command, CommandContext};
use crate::error::{invalid_argument, EngineResult};
use crate::models::{DecisionHistoryRecord, ExecutionEntity, HistoryRecord, Variables};
use crate::runtime::ExecutionEntityManager;
use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GetExecutionCmd {
    pub execution_id: Uuid,
}

#[async_trait]
impl Command for GetExecutionCmd {
    type Output = Option<ExecutionEntity>;

    fn name(&self) -> &'static str {
        "GetExecutionCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<Option<ExecutionEntity>> {
        ExecutionEntityManager::find_by_id(ctx, self.execution_id).await
    }
}

/// Every live execution of a process instance, the root included
#[derive(Debug, Clone)]
pub struct FindExecutionsCmd {
    pub process_instance_id: Uuid,
}

#[async_trait]
impl Command for FindExecutionsCmd {
    type Output = Vec<ExecutionEntity>;

    fn name(&self) -> &'static str {
        "FindExecutionsCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<Vec<ExecutionEntity>> {
        ExecutionEntityManager::find_by_process_instance(ctx, self.process_instance_id).await
    }
}

#[derive(Debug, Clone)]
pub struct FindExecutionsAtNodesCmd {
    pub parent_id: Uuid,
    pub node_ids: HashSet<String>,
}

#[async_trait]
impl Command for FindExecutionsAtNodesCmd {
    type Output = Vec<ExecutionEntity>;

    fn name(&self) -> &'static str {
        "FindExecutionsAtNodesCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<Vec<ExecutionEntity>> {
        ExecutionEntityManager::find_executions_by_parent_and_node_ids(ctx, self.parent_id, &self.node_ids)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GetVariablesCmd {
    pub process_instance_id: Uuid,
}

#[async_trait]
impl Command for GetVariablesCmd {
    type Output = Variables;

    fn name(&self) -> &'static str {
        "GetVariablesCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<Variables> {
        let root = ExecutionEntityManager::require(ctx, self.process_instance_id).await?;
        if !root.is_process_instance() {
            return Err(invalid_argument(format!(
                "execution {} is not a process instance",
                root.id
            )));
        }
        Ok(root.variables)
    }
}

/// Ended executions of a process instance, oldest first
#[derive(Debug, Clone)]
pub struct HistoryQueryCmd {
    pub process_instance_id: Uuid,
}

#[async_trait]
impl Command for HistoryQueryCmd {
    type Output = Vec<HistoryRecord>;

    fn name(&self) -> &'static str {
        "HistoryQueryCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<Vec<HistoryRecord>> {
        let backend = ctx.services().backend.clone();
        Ok(backend.find_history(self.process_instance_id).await?)
    }
}

/// Decision audit trails recorded by business rule tasks of one process instance
#[derive(Debug, Clone)]
pub struct DecisionHistoryQueryCmd {
    pub process_instance_id: Uuid,
}

#[async_trait]
impl Command for DecisionHistoryQueryCmd {
    type Output = Vec<DecisionHistoryRecord>;

    fn name(&self) -> &'static str {
        "DecisionHistoryQueryCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<Vec<DecisionHistoryRecord>> {
        let backend = ctx.services().backend.clone();
        Ok(backend.find_decision_history(self.process_instance_id).await?)
    }
}
