//! # Engine Commands
//!
//! The concrete [`Command`](crate::command::Command)s behind the public
//! services. Commands only touch the execution tree through the runtime
//! managers and leave token movement to the agenda.

pub mod decision;
pub mod events;
pub mod process;
pub mod query;

pub use decision::ExecuteDecisionCmd;
pub use events::{MessageEventReceivedCmd, SignalEventReceivedCmd};
pub use process::{
    DefinitionRef, DeleteProcessInstanceCmd, ProcessInstance, StartProcessInstanceCmd, TriggerCmd,
};
pub use query::{
    DecisionHistoryQueryCmd, FindExecutionsAtNodesCmd, FindExecutionsCmd, GetExecutionCmd,
    GetVariablesCmd, HistoryQueryCmd,
};
