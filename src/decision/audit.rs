use super::table::HitPolicy;
use crate::models::Variables;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome of one input condition of a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionAudit {
    pub input_index: usize,
    pub variable: String,
    pub matched: bool,
    pub failure: Option<String>,
}

/// Outcome of one output expression of a matched rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConclusionAudit {
    pub output_name: String,
    pub result: Option<Value>,
    pub failure: Option<String>,
}

/// Everything recorded for one attempted rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleExecutionAudit {
    /// Zero-based position of the rule in its table
    pub rule_index: usize,
    /// All input conditions held
    pub valid: bool,
    pub condition_results: Vec<ConditionAudit>,
    pub conclusion_results: Vec<ConclusionAudit>,
}

impl RuleExecutionAudit {
    pub fn new(rule_index: usize) -> Self {
        Self {
            rule_index,
            valid: false,
            condition_results: Vec::new(),
            conclusion_results: Vec::new(),
        }
    }

    /// First failure captured against this rule
    pub fn failure(&self) -> Option<&str> {
        self.condition_results
            .iter()
            .filter_map(|c| c.failure.as_deref())
            .chain(self.conclusion_results.iter().filter_map(|c| c.failure.as_deref()))
            .next()
    }

    pub fn is_failed(&self) -> bool {
        self.failure().is_some()
    }
}

/// Audit trail of one decision evaluation
///
/// Evaluation problems never abort the evaluation itself; they are recorded here
/// against the rule (or, for hit-policy violations, the decision) that caused
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionExecutionAudit {
    pub decision_key: String,
    pub decision_name: Option<String>,
    pub hit_policy: HitPolicy,
    pub input_variables: Variables,
    /// Keyed by zero-based rule index
    pub rule_executions: BTreeMap<usize, RuleExecutionAudit>,
    /// Result rows in rule order
    pub decision_results: Vec<Variables>,
    /// Failure of the decision as a whole
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl DecisionExecutionAudit {
    pub fn new(
        decision_key: impl Into<String>,
        decision_name: Option<String>,
        hit_policy: HitPolicy,
        input_variables: Variables,
    ) -> Self {
        Self {
            decision_key: decision_key.into(),
            decision_name,
            hit_policy,
            input_variables,
            rule_executions: BTreeMap::new(),
            decision_results: Vec::new(),
            failure: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn add_rule_execution(&mut self, rule: RuleExecutionAudit) {
        self.rule_executions.insert(rule.rule_index, rule);
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Whether at least one failure was captured anywhere in the trail
    pub fn is_failed(&self) -> bool {
        self.failure.is_some() || self.rule_executions.values().any(RuleExecutionAudit::is_failed)
    }

    /// First failure message, decision-level failures first
    pub fn failure_message(&self) -> Option<String> {
        self.failure.clone().or_else(|| {
            self.rule_executions.values().find_map(|rule| {
                rule.failure()
                    .map(|f| format!("rule {}: {f}", rule.rule_index))
            })
        })
    }

    /// Rules whose conditions all held
    pub fn matched_rules(&self) -> Vec<usize> {
        self.rule_executions
            .values()
            .filter(|r| r.valid)
            .map(|r| r.rule_index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_anywhere_fails_the_trail() {
        let mut audit =
            DecisionExecutionAudit::new("decision", None, HitPolicy::RuleOrder, Variables::new());
        audit.add_rule_execution(RuleExecutionAudit::new(0));
        assert!(!audit.is_failed());

        let mut failing = RuleExecutionAudit::new(1);
        failing.valid = true;
        failing.conclusion_results.push(ConclusionAudit {
            output_name: "output1".to_string(),
            result: None,
            failure: Some("cannot convert 'x' to number".to_string()),
        });
        audit.add_rule_execution(failing);

        assert!(audit.is_failed());
        assert_eq!(audit.matched_rules(), vec![1]);
        assert!(audit.failure_message().unwrap().starts_with("rule 1"));
    }
}
