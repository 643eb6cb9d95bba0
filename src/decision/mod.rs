//! # Decision Tables
//!
//! A rule-table evaluator used by business-rule tasks and the decision service.
//! Every evaluation produces a [`DecisionExecutionAudit`] recording each rule that
//! was tried, its condition and conclusion results and any failure captured
//! against that rule.

pub mod audit;
pub mod condition;
pub mod evaluator;
pub mod expression;
pub mod table;

pub use audit::{ConclusionAudit, ConditionAudit, DecisionExecutionAudit, RuleExecutionAudit};
pub use condition::Condition;
pub use evaluator::{DecisionEvaluator, DecisionRepository, RuleTableEvaluator};
pub use expression::{ArithmeticOp, OutputExpression, OutputType};
pub use table::{DecisionRule, DecisionTable, DecisionTableBuilder, HitPolicy, InputClause, OutputClause};
