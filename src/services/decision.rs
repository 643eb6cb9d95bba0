use crate::command::CommandExecutor;
use crate::commands::ExecuteDecisionCmd;
use crate::decision::DecisionExecutionAudit;
use crate::error::{require_id, EngineError, EngineResult};
use crate::models::Variables;
use serde_json::Value;

/// Stand-alone decision evaluation
#[derive(Debug, Clone)]
pub struct DecisionService {
    executor: CommandExecutor,
}

impl DecisionService {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }

    pub fn create_execute_decision_builder(&self) -> ExecuteDecisionBuilder {
        ExecuteDecisionBuilder {
            executor: self.executor.clone(),
            decision_key: None,
            variables: Variables::new(),
        }
    }
}

/// Fluent construction of a decision evaluation
///
/// The three terminal methods differ in what they return and in how a failed
/// evaluation surfaces:
///
/// * [`execute`](Self::execute) returns every result row in rule order and fails
///   with an evaluation error if the audit recorded a failure.
/// * [`execute_with_single_result`](Self::execute_with_single_result) does the same
///   but requires exactly one row.
/// * [`execute_with_audit_trail`](Self::execute_with_audit_trail) never fails on
///   evaluation problems; they are only visible through the returned audit.
#[derive(Debug, Clone)]
pub struct ExecuteDecisionBuilder {
    executor: CommandExecutor,
    decision_key: Option<String>,
    variables: Variables,
}

impl ExecuteDecisionBuilder {
    pub fn decision_key(mut self, key: impl Into<String>) -> Self {
        self.decision_key = Some(key.into());
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables.extend(variables);
        self
    }

    pub async fn execute(self) -> EngineResult<Vec<Variables>> {
        let audit = self.execute_with_audit_trail().await?;
        if let Some(message) = audit.failure_message() {
            return Err(EngineError::Evaluation {
                decision_key: Some(audit.decision_key),
                node_id: None,
                message,
            });
        }
        Ok(audit.decision_results)
    }

    pub async fn execute_with_single_result(self) -> EngineResult<Variables> {
        let decision_key = self.decision_key.clone().unwrap_or_default();
        let mut rows = self.execute().await?;
        if rows.len() != 1 {
            return Err(EngineError::SingleResultViolation {
                decision_key,
                count: rows.len(),
            });
        }
        Ok(rows.remove(0))
    }

    pub async fn execute_with_audit_trail(self) -> EngineResult<DecisionExecutionAudit> {
        let decision_key = require_id("decision key", self.decision_key.as_deref())?;
        self.executor
            .execute(ExecuteDecisionCmd {
                decision_key,
                variables: self.variables,
            })
            .await
    }
}
