use crate::command::CommandExecutor;
use crate::commands::{
    DefinitionRef, DeleteProcessInstanceCmd, FindExecutionsAtNodesCmd, FindExecutionsCmd,
    GetExecutionCmd, GetVariablesCmd, MessageEventReceivedCmd, ProcessInstance,
    SignalEventReceivedCmd, StartProcessInstanceCmd, TriggerCmd,
};
use crate::error::{require_id, EngineResult};
use crate::models::{ExecutionEntity, Variables};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// Runtime operations on process instances and their executions
#[derive(Debug, Clone)]
pub struct RuntimeService {
    executor: CommandExecutor,
}

impl RuntimeService {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }

    pub fn create_process_instance_builder(&self) -> ProcessInstanceBuilder {
        ProcessInstanceBuilder::new(self.executor.clone())
    }

    pub async fn start_process_instance_by_key(
        &self,
        key: &str,
        variables: Variables,
    ) -> EngineResult<ProcessInstance> {
        self.create_process_instance_builder()
            .process_definition_key(key)
            .variables(variables)
            .start()
            .await
    }

    /// Complete a waiting user task or release a catch event by hand
    pub async fn trigger(&self, execution_id: Uuid, payload: Option<Value>) -> EngineResult<()> {
        self.executor
            .execute(TriggerCmd {
                execution_id,
                payload,
            })
            .await
    }

    /// Returns the number of executions the signal was delivered to
    pub async fn signal_event_received(
        &self,
        signal_name: &str,
        payload: Option<Value>,
    ) -> EngineResult<usize> {
        self.executor
            .execute(SignalEventReceivedCmd {
                signal_name: signal_name.to_string(),
                payload,
            })
            .await
    }

    pub async fn message_event_received(
        &self,
        message_name: &str,
        execution_id: Option<Uuid>,
        payload: Option<Value>,
    ) -> EngineResult<Uuid> {
        self.executor
            .execute(MessageEventReceivedCmd {
                message_name: message_name.to_string(),
                execution_id,
                payload,
            })
            .await
    }

    pub async fn get_execution(&self, execution_id: Uuid) -> EngineResult<Option<ExecutionEntity>> {
        self.executor.execute(GetExecutionCmd { execution_id }).await
    }

    pub async fn find_executions(&self, process_instance_id: Uuid) -> EngineResult<Vec<ExecutionEntity>> {
        self.executor
            .execute(FindExecutionsCmd {
                process_instance_id,
            })
            .await
    }

    pub async fn find_executions_at_nodes(
        &self,
        parent_id: Uuid,
        node_ids: HashSet<String>,
    ) -> EngineResult<Vec<ExecutionEntity>> {
        self.executor
            .execute(FindExecutionsAtNodesCmd { parent_id, node_ids })
            .await
    }

    pub async fn get_variables(&self, process_instance_id: Uuid) -> EngineResult<Variables> {
        self.executor
            .execute(GetVariablesCmd {
                process_instance_id,
            })
            .await
    }

    /// Returns `false` when the instance was already gone by the time it was deleted
    pub async fn delete_process_instance(
        &self,
        process_instance_id: Uuid,
        reason: Option<&str>,
    ) -> EngineResult<bool> {
        self.executor
            .execute(DeleteProcessInstanceCmd {
                process_instance_id,
                reason: reason.map(str::to_string),
            })
            .await
    }
}

/// Fluent construction of a process instance start
#[derive(Debug, Clone)]
pub struct ProcessInstanceBuilder {
    executor: CommandExecutor,
    definition_key: Option<String>,
    definition_id: Option<String>,
    business_key: Option<String>,
    variables: Variables,
}

impl ProcessInstanceBuilder {
    fn new(executor: CommandExecutor) -> Self {
        Self {
            executor,
            definition_key: None,
            definition_id: None,
            business_key: None,
            variables: Variables::new(),
        }
    }

    /// Start the latest deployed version of `key`
    pub fn process_definition_key(mut self, key: impl Into<String>) -> Self {
        self.definition_key = Some(key.into());
        self
    }

    /// Start one exact deployed version; takes precedence over the key
    pub fn process_definition_id(mut self, id: impl Into<String>) -> Self {
        self.definition_id = Some(id.into());
        self
    }

    pub fn business_key(mut self, business_key: impl Into<String>) -> Self {
        self.business_key = Some(business_key.into());
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

    pub async fn start(self) -> EngineResult<ProcessInstance> {
        let definition = match self.definition_id {
            Some(id) => DefinitionRef::Id(require_id("process definition id", Some(&id))?),
            None => DefinitionRef::Key(require_id(
                "process definition key",
                self.definition_key.as_deref(),
            )?),
        };
        self.executor
            .execute(StartProcessInstanceCmd {
                definition,
                business_key: self.business_key,
                variables: self.variables,
            })
            .await
    }
}
