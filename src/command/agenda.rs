//! Operation queue drained by the command invoker after the command body returns.
//!
//! Behaviors never call each other directly; they plan follow-up operations here
//! and the invoker runs them in FIFO order until the queue is empty.

use serde_json::Value;
use std::collections::VecDeque;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum AgendaOperation {
    /// Run the behavior of the node the execution sits at
    ContinueProcess { execution_id: Uuid },
    /// Leave the current node through its outgoing flows
    TakeOutgoingFlows { execution_id: Uuid },
    /// Deliver an external trigger to a waiting execution
    TriggerExecution {
        execution_id: Uuid,
        signal_name: Option<String>,
        payload: Option<Value>,
    },
    /// Finish an execution that reached an end
    EndExecution { execution_id: Uuid },
}

impl AgendaOperation {
    pub fn execution_id(&self) -> Uuid {
        match self {
            Self::ContinueProcess { execution_id }
            | Self::TakeOutgoingFlows { execution_id }
            | Self::TriggerExecution { execution_id, .. }
            | Self::EndExecution { execution_id } => *execution_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ContinueProcess { .. } => "continue_process",
            Self::TakeOutgoingFlows { .. } => "take_outgoing_flows",
            Self::TriggerExecution { .. } => "trigger_execution",
            Self::EndExecution { .. } => "end_execution",
        }
    }
}

#[derive(Debug, Default)]
pub struct Agenda {
    operations: VecDeque<AgendaOperation>,
}

impl Agenda {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(&mut self, operation: AgendaOperation) {
        self.operations.push_back(operation);
    }

    pub fn plan_continue(&mut self, execution_id: Uuid) {
        self.plan(AgendaOperation::ContinueProcess { execution_id });
    }

    pub fn plan_take_outgoing(&mut self, execution_id: Uuid) {
        self.plan(AgendaOperation::TakeOutgoingFlows { execution_id });
    }

    pub fn plan_trigger(
        &mut self,
        execution_id: Uuid,
        signal_name: Option<String>,
        payload: Option<Value>,
    ) {
        self.plan(AgendaOperation::TriggerExecution {
            execution_id,
            signal_name,
            payload,
        });
    }

    pub fn plan_end(&mut self, execution_id: Uuid) {
        self.plan(AgendaOperation::EndExecution { execution_id });
    }

    pub fn next_operation(&mut self) -> Option<AgendaOperation> {
        self.operations.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Drop everything still planned
    pub fn clear(&mut self) {
        self.operations.clear();
    }
}
