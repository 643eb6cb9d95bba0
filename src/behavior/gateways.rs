use super::{ActivityBehavior, ActivityScope, TokenState};
use crate::command::CommandContext;
use crate::constants::delete_reason;
use crate::error::{data_integrity, EngineResult};
use crate::models::ExecutionEntity;
use crate::runtime::ExecutionEntityManager;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;

/// Forks to every target; the targets then race each other
pub struct EventBasedGatewayBehavior;

#[async_trait]
impl ActivityBehavior for EventBasedGatewayBehavior {
    fn name(&self) -> &'static str {
        "EventBasedGatewayBehavior"
    }

    async fn execute(
        &self,
        ctx: &mut CommandContext,
        execution: ExecutionEntity,
        scope: ActivityScope<'_>,
    ) -> EngineResult<()> {
        self.leave(ctx, execution, scope).await
    }
}

/// Selection among conditional flows happens when the token leaves
pub struct ExclusiveGatewayBehavior;

#[async_trait]
impl ActivityBehavior for ExclusiveGatewayBehavior {
    fn name(&self) -> &'static str {
        "ExclusiveGatewayBehavior"
    }

    async fn execute(
        &self,
        ctx: &mut CommandContext,
        execution: ExecutionEntity,
        scope: ActivityScope<'_>,
    ) -> EngineResult<()> {
        self.leave(ctx, execution, scope).await
    }
}

/// Forks on the way out; with several incoming flows it first joins
///
/// Arriving tokens are deactivated and park at the gateway. The token that
/// completes the set removes the parked siblings and continues alone.
pub struct ParallelGatewayBehavior;

#[async_trait]
impl ActivityBehavior for ParallelGatewayBehavior {
    fn name(&self) -> &'static str {
        "ParallelGatewayBehavior"
    }

    async fn execute(
        &self,
        ctx: &mut CommandContext,
        mut execution: ExecutionEntity,
        scope: ActivityScope<'_>,
    ) -> EngineResult<()> {
        let expected = scope.node.incoming.len();
        if expected <= 1 {
            return self.leave(ctx, execution, scope).await;
        }

        let parent_id = execution.parent_id.ok_or_else(|| {
            data_integrity(
                "execution joining at a parallel gateway has no parent",
                Some(execution.id),
                Some(&scope.node.id),
            )
        })?;

        execution.is_active = false;
        ExecutionEntityManager::update(ctx, execution.clone())?;

        let at_gateway: HashSet<String> = [scope.node.id.clone()].into_iter().collect();
        let arrived: Vec<ExecutionEntity> =
            ExecutionEntityManager::find_executions_by_parent_and_node_ids(ctx, parent_id, &at_gateway)
                .await?
                .into_iter()
                .filter(|e| !e.is_active)
                .collect();

        if arrived.len() < expected {
            debug!(
                execution_id = %execution.id,
                node_id = %scope.node.id,
                arrived = arrived.len(),
                expected,
                state = %TokenState::Waiting,
                "Parallel join waiting"
            );
            return Ok(());
        }

        for parked in arrived.iter().filter(|e| e.id != execution.id) {
            ExecutionEntityManager::delete_execution_and_related_data(
                ctx,
                parked.id,
                delete_reason::PARALLEL_GATEWAY_JOIN,
                false,
            )
            .await?;
        }

        execution.is_active = true;
        ExecutionEntityManager::update(ctx, execution.clone())?;
        debug!(execution_id = %execution.id, node_id = %scope.node.id, "Parallel join complete");
        self.leave(ctx, execution, scope).await
    }
}
