use crate::command::CommandExecutor;
use crate::commands::{DecisionHistoryQueryCmd, HistoryQueryCmd};
use crate::error::EngineResult;
use crate::models::{DecisionHistoryRecord, HistoryRecord};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct HistoryService {
    executor: CommandExecutor,
}

impl HistoryService {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }

    /// Ended executions of a process instance in the order they ended
    pub async fn find_history(&self, process_instance_id: Uuid) -> EngineResult<Vec<HistoryRecord>> {
        self.executor
            .execute(HistoryQueryCmd {
                process_instance_id,
            })
            .await
    }

    /// Decision audit trails of a process instance's business rule tasks, oldest first
    pub async fn find_decision_history(
        &self,
        process_instance_id: Uuid,
    ) -> EngineResult<Vec<DecisionHistoryRecord>> {
        self.executor
            .execute(DecisionHistoryQueryCmd {
                process_instance_id,
            })
            .await
    }
}
