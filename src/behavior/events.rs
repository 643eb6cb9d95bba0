use super::{behavior_for, ActivityBehavior, ActivityScope, TokenState};
use crate::command::CommandContext;
use crate::constants::delete_reason;
use crate::definition::{CatchTrigger, FlowNode, NodeKind};
use crate::error::{data_integrity, EngineResult};
use crate::models::{EventType, ExecutionEntity};
use crate::runtime::{EventSubscriptionManager, ExecutionEntityManager};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

pub struct StartEventBehavior;

#[async_trait]
impl ActivityBehavior for StartEventBehavior {
    fn name(&self) -> &'static str {
        "StartEventBehavior"
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

pub struct EndEventBehavior;

#[async_trait]
impl ActivityBehavior for EndEventBehavior {
    fn name(&self) -> &'static str {
        "EndEventBehavior"
    }

    async fn execute(
        &self,
        ctx: &mut CommandContext,
        execution: ExecutionEntity,
        _scope: ActivityScope<'_>,
    ) -> EngineResult<()> {
        ctx.agenda_mut().plan_end(execution.id);
        Ok(())
    }
}

/// Wait state released by a signal, a message or an explicit trigger
///
/// When the node sits behind an event-based gateway, firing it cancels the
/// tokens waiting at the gateway's other targets before the token leaves.
pub struct IntermediateCatchEventBehavior;

#[async_trait]
impl ActivityBehavior for IntermediateCatchEventBehavior {
    fn name(&self) -> &'static str {
        "IntermediateCatchEventBehavior"
    }

    async fn execute(
        &self,
        ctx: &mut CommandContext,
        execution: ExecutionEntity,
        scope: ActivityScope<'_>,
    ) -> EngineResult<()> {
        let subscription = match &scope.node.kind {
            NodeKind::IntermediateCatchEvent {
                trigger: CatchTrigger::Signal { name },
            } => Some((EventType::Signal, name)),
            NodeKind::IntermediateCatchEvent {
                trigger: CatchTrigger::Message { name },
            } => Some((EventType::Message, name)),
            _ => None,
        };
        if let Some((event_type, name)) = subscription {
            EventSubscriptionManager::create(ctx, &execution, &scope.node.id, event_type, name)?;
        }

        debug!(
            execution_id = %execution.id,
            node_id = %scope.node.id,
            state = %TokenState::Waiting,
            "Token waiting at catch event"
        );
        Ok(())
    }

    async fn trigger(
        &self,
        ctx: &mut CommandContext,
        execution: ExecutionEntity,
        scope: ActivityScope<'_>,
        _signal_name: Option<&str>,
        _payload: Option<&Value>,
    ) -> EngineResult<()> {
        if let Some(gateway) = scope.definition.preceding_event_gateway(scope.node) {
            cancel_event_gateway_siblings(ctx, &execution, scope, gateway).await?;
        }
        EventSubscriptionManager::delete_for_execution(ctx, execution.id).await?;
        self.leave(ctx, execution, scope).await
    }
}

/// Cancel the tokens racing `execution` behind `gateway`
///
/// The candidates are the gateway's targets minus the firing node. Each candidate
/// node accounts for at most one cancelled sibling, so when several siblings share
/// a candidate node only the first of them is removed. Returns the ids of the
/// cancelled executions.
pub async fn cancel_event_gateway_siblings(
    ctx: &mut CommandContext,
    execution: &ExecutionEntity,
    scope: ActivityScope<'_>,
    gateway: &FlowNode,
) -> EngineResult<Vec<Uuid>> {
    let definition = scope.definition;
    let mut candidates: HashSet<String> = definition
        .outgoing_flows(gateway)
        .into_iter()
        .map(|flow| flow.target.clone())
        .filter(|target| *target != scope.node.id)
        .collect();
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let parent_id = execution.parent_id.ok_or_else(|| {
        data_integrity(
            "execution behind an event-based gateway has no parent",
            Some(execution.id),
            Some(&scope.node.id),
        )
    })?;

    let siblings =
        ExecutionEntityManager::find_executions_by_parent_and_node_ids(ctx, parent_id, &candidates)
            .await?;

    let mut cancelled = Vec::new();
    for sibling in siblings {
        let Some(node_id) = sibling.current_node_id.clone() else {
            continue;
        };
        if !candidates.remove(&node_id) {
            continue;
        }

        let node = definition.require_node(&node_id)?;
        let sibling_id = sibling.id;
        behavior_for(&node.kind)
            .cancel(
                ctx,
                sibling,
                ActivityScope::new(definition, node),
                delete_reason::EVENT_BASED_GATEWAY_CANCEL,
            )
            .await?;
        cancelled.push(sibling_id);
    }

    info!(
        execution_id = %execution.id,
        node_id = %scope.node.id,
        gateway_id = %gateway.id,
        cancelled = cancelled.len(),
        "Resolved event-based gateway race"
    );
    Ok(cancelled)
}
