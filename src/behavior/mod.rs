//! # Activity Behaviors
//!
//! Per-node-kind logic driving tokens through a process graph. Each [`NodeKind`]
//! maps to one stateless behavior exposing the capability set execute, trigger,
//! leave and cancel. Behaviors never call each other; follow-up work is planned on
//! the command context's agenda.

pub mod events;
pub mod gateways;
pub mod tasks;

use crate::command::CommandContext;
use crate::definition::{FlowNode, NodeKind, ProcessDefinition};
use crate::error::{illegal_state, EngineResult};
use crate::models::ExecutionEntity;
use crate::runtime::ExecutionEntityManager;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

pub use events::{cancel_event_gateway_siblings, EndEventBehavior, IntermediateCatchEventBehavior, StartEventBehavior};
pub use gateways::{EventBasedGatewayBehavior, ExclusiveGatewayBehavior, ParallelGatewayBehavior};
pub use tasks::{BusinessRuleTaskBehavior, TaskBehavior, UserTaskBehavior};

/// Logical position of a token relative to the node it is at. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Arriving,
    Waiting,
    Leaving,
    Advanced,
    Destroyed,
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arriving => write!(f, "arriving"),
            Self::Waiting => write!(f, "waiting"),
            Self::Leaving => write!(f, "leaving"),
            Self::Advanced => write!(f, "advanced"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// The node a behavior runs for, with the definition it belongs to
#[derive(Debug, Clone, Copy)]
pub struct ActivityScope<'a> {
    pub definition: &'a ProcessDefinition,
    pub node: &'a FlowNode,
}

impl<'a> ActivityScope<'a> {
    pub fn new(definition: &'a ProcessDefinition, node: &'a FlowNode) -> Self {
        Self { definition, node }
    }
}

#[async_trait]
pub trait ActivityBehavior: Send + Sync {
    fn name(&self) -> &'static str;

    /// A token arrived at the node
    async fn execute(
        &self,
        ctx: &mut CommandContext,
        execution: ExecutionEntity,
        scope: ActivityScope<'_>,
    ) -> EngineResult<()>;

    /// An external event reached a waiting token
    async fn trigger(
        &self,
        _ctx: &mut CommandContext,
        execution: ExecutionEntity,
        scope: ActivityScope<'_>,
        _signal_name: Option<&str>,
        _payload: Option<&Value>,
    ) -> EngineResult<()> {
        Err(illegal_state(format!(
            "execution {} at node '{}' ({}) is not waiting and cannot be triggered",
            execution.id, scope.node.id, scope.node.kind
        )))
    }

    /// Default completion: follow the outgoing flows
    async fn leave(
        &self,
        ctx: &mut CommandContext,
        execution: ExecutionEntity,
        _scope: ActivityScope<'_>,
    ) -> EngineResult<()> {
        ctx.agenda_mut().plan_take_outgoing(execution.id);
        Ok(())
    }

    /// Remove a token that lost a race or was otherwise cancelled
    async fn cancel(
        &self,
        ctx: &mut CommandContext,
        execution: ExecutionEntity,
        _scope: ActivityScope<'_>,
        reason: &str,
    ) -> EngineResult<()> {
        ExecutionEntityManager::delete_execution_and_related_data(ctx, execution.id, reason, false)
            .await
            .map(|_| ())
    }
}

/// Behavior for a node kind
pub fn behavior_for(kind: &NodeKind) -> &'static dyn ActivityBehavior {
    match kind {
        NodeKind::StartEvent => &StartEventBehavior,
        NodeKind::EndEvent => &EndEventBehavior,
        NodeKind::Task => &TaskBehavior,
        NodeKind::UserTask => &UserTaskBehavior,
        NodeKind::IntermediateCatchEvent { .. } => &IntermediateCatchEventBehavior,
        NodeKind::EventBasedGateway => &EventBasedGatewayBehavior,
        NodeKind::ParallelGateway => &ParallelGatewayBehavior,
        NodeKind::ExclusiveGateway { .. } => &ExclusiveGatewayBehavior,
        NodeKind::BusinessRuleTask { .. } => &BusinessRuleTaskBehavior,
    }
}
