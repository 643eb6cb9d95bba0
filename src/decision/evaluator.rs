use super::audit::{ConclusionAudit, ConditionAudit, DecisionExecutionAudit, RuleExecutionAudit};
use super::table::{DecisionRule, DecisionTable, HitPolicy};
use crate::error::{EngineError, EngineResult};
use crate::models::Variables;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Computes decision outcomes together with their audit trail
///
/// Only an unknown decision key is an error; everything that goes wrong during
/// evaluation is recorded in the returned audit.
pub trait DecisionEvaluator: Send + Sync {
    fn evaluate(&self, decision_key: &str, variables: &Variables) -> EngineResult<DecisionExecutionAudit>;
}

/// Deployed decision tables by key; redeploying a key replaces the table
#[derive(Debug, Default)]
pub struct DecisionRepository {
    tables: DashMap<String, Arc<DecisionTable>>,
}

impl DecisionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy(&self, table: DecisionTable) -> EngineResult<Arc<DecisionTable>> {
        table.validate()?;
        let table = Arc::new(table);
        self.tables.insert(table.key.clone(), table.clone());
        info!(decision_key = %table.key, rules = table.rules.len(), "Deployed decision table");
        Ok(table)
    }

    pub fn find(&self, decision_key: &str) -> Option<Arc<DecisionTable>> {
        self.tables.get(decision_key).map(|entry| entry.value().clone())
    }
}

/// Evaluator over the tables of a [`DecisionRepository`]
#[derive(Debug, Clone)]
pub struct RuleTableEvaluator {
    repository: Arc<DecisionRepository>,
}

impl RuleTableEvaluator {
    pub fn new(repository: Arc<DecisionRepository>) -> Self {
        Self { repository }
    }

    /// Evaluate one table against `variables`
    pub fn evaluate_table(table: &DecisionTable, variables: &Variables) -> DecisionExecutionAudit {
        let mut audit = DecisionExecutionAudit::new(
            table.key.clone(),
            table.name.clone(),
            table.hit_policy,
            variables.clone(),
        );

        for (index, rule) in table.rules.iter().enumerate() {
            let mut rule_audit = RuleExecutionAudit::new(index);
            rule_audit.valid = Self::evaluate_conditions(table, rule, variables, &mut rule_audit);

            if rule_audit.valid {
                if let Some(row) = Self::evaluate_conclusions(table, rule, variables, &mut rule_audit) {
                    audit.decision_results.push(row);
                }
            }

            let stop = rule_audit.valid && table.hit_policy == HitPolicy::First;
            audit.add_rule_execution(rule_audit);
            if stop {
                break;
            }
        }

        if table.hit_policy == HitPolicy::Unique {
            let matched = audit.matched_rules();
            if matched.len() > 1 {
                audit.failure = Some(format!(
                    "hit policy UNIQUE violated: rules {matched:?} all matched"
                ));
                audit.decision_results.clear();
            }
        }

        audit.finish();
        debug!(
            decision_key = %table.key,
            results = audit.decision_results.len(),
            failed = audit.is_failed(),
            "Decision evaluated"
        );
        audit
    }

    /// True when every condition held; stops at the first miss
    fn evaluate_conditions(
        table: &DecisionTable,
        rule: &DecisionRule,
        variables: &Variables,
        rule_audit: &mut RuleExecutionAudit,
    ) -> bool {
        for (input_index, (clause, condition)) in
            table.inputs.iter().zip(&rule.input_entries).enumerate()
        {
            let outcome = match variables.get(&clause.variable) {
                None if clause.required => Err(format!(
                    "required input variable '{}' is missing",
                    clause.variable
                )),
                None => condition.evaluate(&Value::Null),
                Some(value) => condition.evaluate(value),
            };

            let (matched, failure) = match outcome {
                Ok(matched) => (matched, None),
                Err(message) => (false, Some(message)),
            };
            rule_audit.condition_results.push(ConditionAudit {
                input_index,
                variable: clause.variable.clone(),
                matched,
                failure,
            });
            if !matched {
                return false;
            }
        }
        true
    }

    /// Result row of a matched rule, or `None` if any output failed
    fn evaluate_conclusions(
        table: &DecisionTable,
        rule: &DecisionRule,
        variables: &Variables,
        rule_audit: &mut RuleExecutionAudit,
    ) -> Option<Variables> {
        let mut row = Variables::new();
        let mut complete = true;

        for (clause, expression) in table.outputs.iter().zip(&rule.output_entries) {
            match expression
                .evaluate(variables)
                .and_then(|value| clause.output_type.coerce(value))
            {
                Ok(value) => {
                    row.insert(clause.name.clone(), value.clone());
                    rule_audit.conclusion_results.push(ConclusionAudit {
                        output_name: clause.name.clone(),
                        result: Some(value),
                        failure: None,
                    });
                }
                Err(message) => {
                    complete = false;
                    rule_audit.conclusion_results.push(ConclusionAudit {
                        output_name: clause.name.clone(),
                        result: None,
                        failure: Some(message),
                    });
                }
            }
        }

        complete.then_some(row)
    }
}

impl DecisionEvaluator for RuleTableEvaluator {
    fn evaluate(&self, decision_key: &str, variables: &Variables) -> EngineResult<DecisionExecutionAudit> {
        let table = self
            .repository
            .find(decision_key)
            .ok_or_else(|| EngineError::NotFound {
                entity: "decision",
                id: decision_key.to_string(),
            })?;
        Ok(Self::evaluate_table(&table, variables))
    }
}
