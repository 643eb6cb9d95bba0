//! # Agenda Operations
//!
//! The interpreter loop that moves tokens through a process graph. Each planned
//! [`AgendaOperation`] resolves its execution and node afresh, so an operation
//! whose execution was removed by an earlier one (a cancelled race, a completed
//! join) is skipped instead of failing.

use crate::behavior::{behavior_for, ActivityScope, TokenState};
use crate::command::{AgendaOperation, CommandContext};
use crate::constants::{delete_reason, events};
use crate::definition::{FlowNode, NodeKind, ProcessDefinition, SequenceFlow};
use crate::error::{data_integrity, EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::models::{ExecutionEntity, Variables};
use crate::runtime::ExecutionEntityManager;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Upper bound on operations drained in one unit of work; a graph that loops
/// without reaching a wait state would otherwise never return
pub const MAX_AGENDA_OPERATIONS: usize = 10_000;

/// Drain the agenda of `ctx` in FIFO order
pub async fn run_agenda(ctx: &mut CommandContext) -> EngineResult<()> {
    let mut executed = 0usize;
    while let Some(operation) = ctx.agenda_mut().next_operation() {
        executed += 1;
        if executed > MAX_AGENDA_OPERATIONS {
            return Err(EngineError::Internal(format!(
                "agenda exceeded {MAX_AGENDA_OPERATIONS} operations in context {}",
                ctx.id()
            )));
        }

        trace!(
            context_id = %ctx.id(),
            operation = operation.name(),
            execution_id = %operation.execution_id(),
            "Running agenda operation"
        );
        match operation {
            AgendaOperation::ContinueProcess { execution_id } => {
                continue_process(ctx, execution_id).await?
            }
            AgendaOperation::TakeOutgoingFlows { execution_id } => {
                take_outgoing_flows(ctx, execution_id).await?
            }
            AgendaOperation::TriggerExecution {
                execution_id,
                signal_name,
                payload,
            } => {
                trigger_execution(ctx, execution_id, signal_name.as_deref(), payload.as_ref())
                    .await?
            }
            AgendaOperation::EndExecution { execution_id } => end_execution(ctx, execution_id).await?,
        }
    }

    if executed > 0 {
        debug!(context_id = %ctx.id(), executed, "Agenda drained");
    }
    Ok(())
}

/// Execution and the node it sits at, or `None` if the execution is gone
async fn locate(
    ctx: &mut CommandContext,
    execution_id: Uuid,
) -> EngineResult<Option<(ExecutionEntity, Arc<ProcessDefinition>)>> {
    let Some(execution) = ExecutionEntityManager::find_by_id(ctx, execution_id).await? else {
        debug!(execution_id = %execution_id, "Execution no longer exists, skipping operation");
        return Ok(None);
    };
    if execution.current_node_id.is_none() {
        return Err(data_integrity(
            "execution is not positioned at any node",
            Some(execution.id),
            None,
        ));
    }
    let definition = ctx.definition(&execution.process_definition_id)?;
    Ok(Some((execution, definition)))
}

fn node_of<'d>(definition: &'d ProcessDefinition, execution: &ExecutionEntity) -> EngineResult<&'d FlowNode> {
    let node_id = execution.current_node_id().unwrap_or_default();
    definition.require_node(node_id).map_err(|_| {
        data_integrity(
            format!("node '{node_id}' does not exist in process definition '{}'", definition.id),
            Some(execution.id),
            Some(node_id),
        )
    })
}

async fn continue_process(ctx: &mut CommandContext, execution_id: Uuid) -> EngineResult<()> {
    let Some((execution, definition)) = locate(ctx, execution_id).await? else {
        return Ok(());
    };
    let node = node_of(&definition, &execution)?;
    let behavior = behavior_for(&node.kind);
    trace!(
        execution_id = %execution.id,
        node_id = %node.id,
        behavior = behavior.name(),
        state = %TokenState::Arriving,
        "Token arriving"
    );
    behavior
        .execute(ctx, execution, ActivityScope::new(&definition, node))
        .await
}

async fn take_outgoing_flows(ctx: &mut CommandContext, execution_id: Uuid) -> EngineResult<()> {
    let Some((mut execution, definition)) = locate(ctx, execution_id).await? else {
        return Ok(());
    };
    let node = node_of(&definition, &execution)?;
    let variables = process_variables(ctx, &execution).await?;
    let selected = select_outgoing_flows(&definition, node, &variables, &execution)?;

    trace!(
        execution_id = %execution.id,
        node_id = %node.id,
        flows = selected.len(),
        state = %TokenState::Leaving,
        "Token leaving"
    );

    let Some((first, rest)) = selected.split_first() else {
        // Implicit end
        ctx.agenda_mut().plan_end(execution.id);
        return Ok(());
    };

    let parent = if rest.is_empty() {
        None
    } else {
        let parent_id = execution.parent_id.ok_or_else(|| {
            data_integrity(
                "cannot fork from an execution without a parent",
                Some(execution.id),
                Some(&node.id),
            )
        })?;
        Some(ExecutionEntityManager::require(ctx, parent_id).await?)
    };

    execution.current_node_id = Some(first.target.clone());
    execution.is_active = true;
    ExecutionEntityManager::update(ctx, execution.clone())?;
    ctx.agenda_mut().plan_continue(execution.id);
    trace!(
        execution_id = %execution.id,
        flow_id = %first.id,
        target = %first.target,
        state = %TokenState::Advanced,
        "Token advanced"
    );

    if let Some(parent) = parent {
        for flow in rest {
            let child = ExecutionEntityManager::create_child_execution(ctx, &parent, &flow.target)?;
            ctx.agenda_mut().plan_continue(child.id);
            trace!(
                execution_id = %child.id,
                flow_id = %flow.id,
                target = %flow.target,
                state = %TokenState::Advanced,
                "Forked token advanced"
            );
        }
    }
    Ok(())
}

/// Flows a token leaves `node` through
///
/// An exclusive gateway takes the first flow, in declaration order, whose
/// condition holds, falling back to its default flow. Every other node takes all
/// flows whose condition holds; unconditional flows always hold. A node with
/// outgoing flows of which none holds is an evaluation error; an empty result
/// means the node has no outgoing flows.
pub fn select_outgoing_flows<'d>(
    definition: &'d ProcessDefinition,
    node: &FlowNode,
    variables: &Variables,
    execution: &ExecutionEntity,
) -> EngineResult<Vec<&'d SequenceFlow>> {
    let evaluation_error = |flow: &SequenceFlow, message: String| EngineError::Evaluation {
        decision_key: None,
        node_id: Some(node.id.clone()),
        message: format!("condition of flow '{}' failed: {message}", flow.id),
    };

    let outgoing = definition.outgoing_flows(node);
    match &node.kind {
        NodeKind::ExclusiveGateway { default_flow } => {
            for &flow in &outgoing {
                if default_flow.as_deref() == Some(flow.id.as_str()) {
                    continue;
                }
                let holds = match &flow.condition {
                    Some(condition) => condition
                        .evaluate(variables)
                        .map_err(|message| evaluation_error(flow, message))?,
                    None => true,
                };
                if holds {
                    return Ok(vec![flow]);
                }
            }
            if let Some(default) = default_flow.as_deref().and_then(|id| definition.flow(id)) {
                return Ok(vec![default]);
            }
            Err(EngineError::Evaluation {
                decision_key: None,
                node_id: Some(node.id.clone()),
                message: format!(
                    "no outgoing flow of exclusive gateway could be selected for execution {}",
                    execution.id
                ),
            })
        }
        _ => {
            let mut selected = Vec::with_capacity(outgoing.len());
            for &flow in &outgoing {
                let holds = match &flow.condition {
                    Some(condition) => condition
                        .evaluate(variables)
                        .map_err(|message| evaluation_error(flow, message))?,
                    None => true,
                };
                if holds {
                    selected.push(flow);
                }
            }
            // Flows exist but none holds
            if selected.is_empty() && !outgoing.is_empty() {
                return Err(EngineError::Evaluation {
                    decision_key: None,
                    node_id: Some(node.id.clone()),
                    message: format!(
                        "no outgoing flow of node could be selected for execution {}",
                        execution.id
                    ),
                });
            }
            Ok(selected)
        }
    }
}

async fn trigger_execution(
    ctx: &mut CommandContext,
    execution_id: Uuid,
    signal_name: Option<&str>,
    payload: Option<&Value>,
) -> EngineResult<()> {
    let Some((execution, definition)) = locate(ctx, execution_id).await? else {
        return Ok(());
    };
    if let Some(payload) = payload {
        ExecutionEntityManager::merge_process_variables(ctx, execution.process_instance_id, payload)
            .await?;
    }
    let node = node_of(&definition, &execution)?;
    behavior_for(&node.kind)
        .trigger(
            ctx,
            execution,
            ActivityScope::new(&definition, node),
            signal_name,
            payload,
        )
        .await
}

async fn end_execution(ctx: &mut CommandContext, execution_id: Uuid) -> EngineResult<()> {
    let Some(execution) = ExecutionEntityManager::find_by_id(ctx, execution_id).await? else {
        return Ok(());
    };

    ExecutionEntityManager::delete_execution_and_related_data(
        ctx,
        execution.id,
        delete_reason::ACTIVITY_END,
        false,
    )
    .await?;
    trace!(execution_id = %execution.id, state = %TokenState::Destroyed, "Token destroyed");

    let Some(parent_id) = execution.parent_id else {
        return Ok(());
    };
    let remaining = ExecutionEntityManager::find_child_executions(ctx, parent_id).await?;
    if !remaining.is_empty() {
        return Ok(());
    }

    let Some(parent) = ExecutionEntityManager::find_by_id(ctx, parent_id).await? else {
        return Ok(());
    };
    if !parent.is_process_instance() {
        return Ok(());
    }

    let ended = ExecutionEntityManager::delete_execution_and_related_data(
        ctx,
        parent.id,
        delete_reason::PROCESS_INSTANCE_ENDED,
        false,
    )
    .await?;
    if ended {
        ctx.queue_event(
            EngineEvent::new(events::PROCESS_COMPLETED)
                .with_process_instance(parent.id)
                .with_payload(serde_json::json!({
                    "process_definition_id": parent.process_definition_id,
                    "business_key": parent.business_key,
                })),
        );
        info!(
            process_instance_id = %parent.id,
            definition_id = %parent.process_definition_id,
            "Process instance completed"
        );
    }
    Ok(())
}

/// Variables of the process instance `execution` belongs to
async fn process_variables(
    ctx: &mut CommandContext,
    execution: &ExecutionEntity,
) -> EngineResult<Variables> {
    if execution.is_process_instance() {
        return Ok(execution.variables.clone());
    }
    Ok(ExecutionEntityManager::require(ctx, execution.process_instance_id)
        .await?
        .variables)
}
