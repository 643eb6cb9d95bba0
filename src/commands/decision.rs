use crate::command::{Command, CommandContext};
use crate::constants::events;
use crate::decision::DecisionExecutionAudit;
use crate::error::EngineResult;
use crate::events::EngineEvent;
use crate::models::Variables;
use async_trait::async_trait;
use serde_json::json;

/// Evaluate a deployed decision table outside of any process
///
/// Evaluation failures are part of the returned audit; only an unknown key
/// fails the command.
#[derive(Debug, Clone)]
pub struct ExecuteDecisionCmd {
    pub decision_key: String,
    pub variables: Variables,
}

#[async_trait]
impl Command for ExecuteDecisionCmd {
    type Output = DecisionExecutionAudit;

    fn name(&self) -> &'static str {
        "ExecuteDecisionCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<DecisionExecutionAudit> {
        let audit = ctx
            .services()
            .decisions
            .evaluate(&self.decision_key, &self.variables)?;
        ctx.queue_event(EngineEvent::new(events::DECISION_EVALUATED).with_payload(json!({
            "decision_key": self.decision_key,
            "results": audit.decision_results.len(),
            "failed": audit.is_failed(),
        })));
        Ok(audit)
    }
}
