use super::condition::Condition;
use super::expression::{OutputExpression, OutputType};
use crate::error::{invalid_argument, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How matching rules turn into results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitPolicy {
    /// At most one rule may match
    Unique,
    /// Stop at the first matching rule
    First,
    /// Every matching rule, in rule order
    RuleOrder,
    /// Every matching rule, unordered by contract
    Collect,
}

impl fmt::Display for HitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unique => write!(f, "UNIQUE"),
            Self::First => write!(f, "FIRST"),
            Self::RuleOrder => write!(f, "RULE_ORDER"),
            Self::Collect => write!(f, "COLLECT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputClause {
    pub variable: String,
    /// A missing required input is a failure; other missing inputs read as null
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputClause {
    pub name: String,
    pub output_type: OutputType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRule {
    /// One condition per input clause
    pub input_entries: Vec<Condition>,
    /// One expression per output clause
    pub output_entries: Vec<OutputExpression>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTable {
    pub key: String,
    pub name: Option<String>,
    pub hit_policy: HitPolicy,
    pub inputs: Vec<InputClause>,
    pub outputs: Vec<OutputClause>,
    pub rules: Vec<DecisionRule>,
}

impl DecisionTable {
    pub fn builder(key: impl Into<String>) -> DecisionTableBuilder {
        DecisionTableBuilder::new(key)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.key.trim().is_empty() {
            return Err(invalid_argument("decision key must not be empty"));
        }
        if self.outputs.is_empty() {
            return Err(invalid_argument(format!(
                "decision '{}' declares no outputs",
                self.key
            )));
        }
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.input_entries.len() != self.inputs.len()
                || rule.output_entries.len() != self.outputs.len()
            {
                return Err(invalid_argument(format!(
                    "rule {index} of decision '{}' has {} input and {} output entries, expected {} and {}",
                    self.key,
                    rule.input_entries.len(),
                    rule.output_entries.len(),
                    self.inputs.len(),
                    self.outputs.len()
                )));
            }
        }
        Ok(())
    }
}

/// Fluent construction of a [`DecisionTable`]
#[derive(Debug, Clone)]
pub struct DecisionTableBuilder {
    table: DecisionTable,
}

impl DecisionTableBuilder {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            table: DecisionTable {
                key: key.into(),
                name: None,
                hit_policy: HitPolicy::Unique,
                inputs: Vec::new(),
                outputs: Vec::new(),
                rules: Vec::new(),
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.table.name = Some(name.into());
        self
    }

    pub fn hit_policy(mut self, hit_policy: HitPolicy) -> Self {
        self.table.hit_policy = hit_policy;
        self
    }

    pub fn input(mut self, variable: impl Into<String>) -> Self {
        self.table.inputs.push(InputClause {
            variable: variable.into(),
            required: false,
        });
        self
    }

    pub fn required_input(mut self, variable: impl Into<String>) -> Self {
        self.table.inputs.push(InputClause {
            variable: variable.into(),
            required: true,
        });
        self
    }

    pub fn output(mut self, name: impl Into<String>, output_type: OutputType) -> Self {
        self.table.outputs.push(OutputClause {
            name: name.into(),
            output_type,
        });
        self
    }

    pub fn rule(mut self, input_entries: Vec<Condition>, output_entries: Vec<OutputExpression>) -> Self {
        self.table.rules.push(DecisionRule {
            input_entries,
            output_entries,
            description: None,
        });
        self
    }

    pub fn build(self) -> EngineResult<DecisionTable> {
        self.table.validate()?;
        Ok(self.table)
    }
}
