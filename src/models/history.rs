use crate::decision::DecisionExecutionAudit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit entry written once per removed execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub execution_id: Uuid,
    pub process_instance_id: Uuid,
    pub node_id: Option<String>,
    pub delete_reason: String,
    pub is_process_instance: bool,
    pub ended_at: DateTime<Utc>,
}

/// Audit trail of a decision evaluated by a business rule task
///
/// Written with the unit of work that ran the task. When a mandatory evaluation
/// fails and the unit of work rolls back, the record is still written on its own
/// so the failure stays queryable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionHistoryRecord {
    pub id: Uuid,
    pub process_instance_id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub decision_key: String,
    /// The task required the evaluation to succeed
    pub fail_on_error: bool,
    pub audit: DecisionExecutionAudit,
    pub evaluated_at: DateTime<Utc>,
}

impl DecisionHistoryRecord {
    pub fn is_failed(&self) -> bool {
        self.audit.is_failed()
    }
}
