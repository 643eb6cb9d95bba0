use super::model::{CatchTrigger, FlowCondition, FlowNode, NodeKind, ProcessDefinition, SequenceFlow};
use crate::error::{invalid_argument, EngineResult};
use std::collections::HashMap;

/// Fluent construction of a [`ProcessDefinition`]
///
/// # Example
///
/// ```rust
/// use process_engine::definition::ProcessDefinitionBuilder;
///
/// let definition = ProcessDefinitionBuilder::new("approval")
///     .start_event("start")
///     .user_task("review")
///     .end_event("end")
///     .flow("start", "review")
///     .flow("review", "end")
///     .build()
///     .unwrap();
///
/// assert_eq!(definition.id, "approval:1");
/// ```
#[derive(Debug, Clone)]
pub struct ProcessDefinitionBuilder {
    key: String,
    name: Option<String>,
    nodes: Vec<FlowNode>,
    flows: Vec<SequenceFlow>,
    errors: Vec<String>,
}

impl ProcessDefinitionBuilder {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: None,
            nodes: Vec::new(),
            flows: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn node(mut self, id: impl Into<String>, kind: NodeKind) -> Self {
        let id = id.into();
        if self.nodes.iter().any(|n| n.id == id) {
            self.errors.push(format!("duplicate node id '{id}'"));
            return self;
        }
        self.nodes.push(FlowNode {
            id,
            name: None,
            kind,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
        self
    }

    pub fn start_event(self, id: impl Into<String>) -> Self {
        self.node(id, NodeKind::StartEvent)
    }

    pub fn end_event(self, id: impl Into<String>) -> Self {
        self.node(id, NodeKind::EndEvent)
    }

    pub fn task(self, id: impl Into<String>) -> Self {
        self.node(id, NodeKind::Task)
    }

    pub fn user_task(self, id: impl Into<String>) -> Self {
        self.node(id, NodeKind::UserTask)
    }

    pub fn catch_event(self, id: impl Into<String>) -> Self {
        self.node(
            id,
            NodeKind::IntermediateCatchEvent {
                trigger: CatchTrigger::None,
            },
        )
    }

    pub fn catch_signal(self, id: impl Into<String>, signal: impl Into<String>) -> Self {
        self.node(
            id,
            NodeKind::IntermediateCatchEvent {
                trigger: CatchTrigger::Signal { name: signal.into() },
            },
        )
    }

    pub fn catch_message(self, id: impl Into<String>, message: impl Into<String>) -> Self {
        self.node(
            id,
            NodeKind::IntermediateCatchEvent {
                trigger: CatchTrigger::Message {
                    name: message.into(),
                },
            },
        )
    }

    pub fn event_gateway(self, id: impl Into<String>) -> Self {
        self.node(id, NodeKind::EventBasedGateway)
    }

    pub fn parallel_gateway(self, id: impl Into<String>) -> Self {
        self.node(id, NodeKind::ParallelGateway)
    }

    pub fn exclusive_gateway(self, id: impl Into<String>) -> Self {
        self.node(id, NodeKind::ExclusiveGateway { default_flow: None })
    }

    pub fn business_rule_task(
        self,
        id: impl Into<String>,
        decision_key: impl Into<String>,
        result_variable: impl Into<String>,
        fail_on_error: bool,
    ) -> Self {
        self.node(
            id,
            NodeKind::BusinessRuleTask {
                decision_key: decision_key.into(),
                result_variable: result_variable.into(),
                fail_on_error,
            },
        )
    }

    /// Connect two nodes; the flow id is generated
    pub fn flow(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        let id = format!("flow{}", self.flows.len() + 1);
        self.add_flow(id, source.into(), target.into(), None)
    }

    pub fn flow_with_id(
        self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.add_flow(id.into(), source.into(), target.into(), None)
    }

    pub fn conditional_flow(
        self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        condition: FlowCondition,
    ) -> Self {
        self.add_flow(id.into(), source.into(), target.into(), Some(condition))
    }

    /// Mark `flow_id` as the default flow of exclusive gateway `gateway_id`
    pub fn default_flow(mut self, gateway_id: &str, flow_id: impl Into<String>) -> Self {
        let flow_id = flow_id.into();
        match self.nodes.iter_mut().find(|n| n.id == gateway_id) {
            Some(FlowNode {
                kind: NodeKind::ExclusiveGateway { default_flow },
                ..
            }) => *default_flow = Some(flow_id),
            _ => self
                .errors
                .push(format!("'{gateway_id}' is not an exclusive gateway")),
        }
        self
    }

    fn add_flow(
        mut self,
        id: String,
        source: String,
        target: String,
        condition: Option<FlowCondition>,
    ) -> Self {
        if self.flows.iter().any(|f| f.id == id) {
            self.errors.push(format!("duplicate flow id '{id}'"));
            return self;
        }
        self.flows.push(SequenceFlow {
            id,
            source,
            target,
            condition,
        });
        self
    }

    /// Assemble and validate; the definition gets version 1
    pub fn build(self) -> EngineResult<ProcessDefinition> {
        if let Some(first) = self.errors.first() {
            return Err(invalid_argument(format!(
                "invalid process definition '{}': {first}",
                self.key
            )));
        }

        let mut nodes: HashMap<String, FlowNode> =
            self.nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        for flow in &self.flows {
            if let Some(source) = nodes.get_mut(&flow.source) {
                source.outgoing.push(flow.id.clone());
            }
            if let Some(target) = nodes.get_mut(&flow.target) {
                target.incoming.push(flow.id.clone());
            }
        }

        let start_node_id = nodes
            .values()
            .find(|n| n.kind == NodeKind::StartEvent)
            .map(|n| n.id.clone())
            .unwrap_or_default();

        let definition = ProcessDefinition {
            id: ProcessDefinition::definition_id(&self.key, 1),
            key: self.key,
            version: 1,
            name: self.name,
            start_node_id,
            nodes,
            flows: self.flows.into_iter().map(|f| (f.id.clone(), f)).collect(),
        };
        definition.validate()?;
        Ok(definition)
    }
}
