use super::{ActivityBehavior, ActivityScope, TokenState};
use crate::command::CommandContext;
use crate::constants::events;
use crate::definition::NodeKind;
use crate::error::{illegal_state, EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::models::{DecisionHistoryRecord, ExecutionEntity};
use crate::runtime::ExecutionEntityManager;
use async_trait::async_trait;
use serde_json::{json, Value};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Automatic activity; passes straight through
pub struct TaskBehavior;

#[async_trait]
impl ActivityBehavior for TaskBehavior {
    fn name(&self) -> &'static str {
        "TaskBehavior"
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

/// Wait state completed by an explicit trigger
pub struct UserTaskBehavior;

#[async_trait]
impl ActivityBehavior for UserTaskBehavior {
    fn name(&self) -> &'static str {
        "UserTaskBehavior"
    }

    async fn execute(
        &self,
        _ctx: &mut CommandContext,
        execution: ExecutionEntity,
        scope: ActivityScope<'_>,
    ) -> EngineResult<()> {
        debug!(
            execution_id = %execution.id,
            node_id = %scope.node.id,
            state = %TokenState::Waiting,
            "Token waiting at user task"
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
        self.leave(ctx, execution, scope).await
    }
}

/// Evaluates a decision table against the process variables and stores the
/// result rows under the configured variable
///
/// A failed evaluation aborts the command only when the node asks for it;
/// otherwise the failure is logged and the rows that were produced are kept.
/// With history enabled every audit trail is recorded as a
/// [`DecisionHistoryRecord`]; the one of an aborting failure survives the rollback.
pub struct BusinessRuleTaskBehavior;

#[async_trait]
impl ActivityBehavior for BusinessRuleTaskBehavior {
    fn name(&self) -> &'static str {
        "BusinessRuleTaskBehavior"
    }

    async fn execute(
        &self,
        ctx: &mut CommandContext,
        execution: ExecutionEntity,
        scope: ActivityScope<'_>,
    ) -> EngineResult<()> {
        let NodeKind::BusinessRuleTask {
            decision_key,
            result_variable,
            fail_on_error,
        } = &scope.node.kind
        else {
            return Err(illegal_state(format!(
                "node '{}' is not a business rule task",
                scope.node.id
            )));
        };

        let mut root = ExecutionEntityManager::require(ctx, execution.process_instance_id).await?;
        let audit = ctx
            .services()
            .decisions
            .evaluate(decision_key, &root.variables)?;

        ctx.queue_event(
            EngineEvent::new(events::DECISION_EVALUATED)
                .with_process_instance(execution.process_instance_id)
                .with_execution(execution.id, Some(&scope.node.id))
                .with_payload(json!({
                    "decision_key": decision_key,
                    "results": audit.decision_results.len(),
                    "failed": audit.is_failed(),
                })),
        );

        let record = ctx.config().history.enabled.then(|| DecisionHistoryRecord {
            id: Uuid::new_v4(),
            process_instance_id: execution.process_instance_id,
            execution_id: execution.id,
            node_id: scope.node.id.clone(),
            decision_key: decision_key.clone(),
            fail_on_error: *fail_on_error,
            audit: audit.clone(),
            evaluated_at: Utc::now(),
        });

        if let Some(message) = audit.failure_message() {
            if *fail_on_error {
                if let Some(record) = record {
                    ctx.record_decision_failure(record);
                }
                return Err(EngineError::Evaluation {
                    decision_key: Some(decision_key.clone()),
                    node_id: Some(scope.node.id.clone()),
                    message,
                });
            }
            warn!(
                execution_id = %execution.id,
                node_id = %scope.node.id,
                decision_key = %decision_key,
                failure = %message,
                "Decision evaluation failed, continuing with partial results"
            );
        }

        if let Some(record) = record {
            ctx.db_session()?.record_decision(record);
        }

        let rows: Vec<Value> = audit
            .decision_results
            .into_iter()
            .map(Value::Object)
            .collect();
        root.variables.insert(result_variable.clone(), Value::Array(rows));
        ExecutionEntityManager::update(ctx, root)?;

        self.leave(ctx, execution, scope).await
    }
}
