use crate::decision::Condition;
use crate::error::{data_integrity, invalid_argument, EngineResult};
use crate::models::Variables;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// What a catch event waits for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CatchTrigger {
    /// Only an explicit trigger of the execution moves it on
    None,
    Signal { name: String },
    Message { name: String },
}

/// Node kind tag; behavior is dispatched on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    StartEvent,
    EndEvent,
    /// Pass-through activity
    Task,
    /// Wait state left by an explicit trigger
    UserTask,
    IntermediateCatchEvent { trigger: CatchTrigger },
    EventBasedGateway,
    ParallelGateway,
    ExclusiveGateway { default_flow: Option<String> },
    BusinessRuleTask {
        decision_key: String,
        result_variable: String,
        /// Evaluation failures abort the command instead of only being audited
        fail_on_error: bool,
    },
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::StartEvent => "start_event",
            Self::EndEvent => "end_event",
            Self::Task => "task",
            Self::UserTask => "user_task",
            Self::IntermediateCatchEvent { .. } => "intermediate_catch_event",
            Self::EventBasedGateway => "event_based_gateway",
            Self::ParallelGateway => "parallel_gateway",
            Self::ExclusiveGateway { .. } => "exclusive_gateway",
            Self::BusinessRuleTask { .. } => "business_rule_task",
        }
    }

    /// Whether a token stays at the node until triggered
    pub fn is_wait_state(&self) -> bool {
        matches!(self, Self::UserTask | Self::IntermediateCatchEvent { .. })
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    pub name: Option<String>,
    pub kind: NodeKind,
    /// Incoming flow ids in declaration order
    pub incoming: Vec<String>,
    /// Outgoing flow ids in declaration order
    pub outgoing: Vec<String>,
}

/// Guard on a sequence flow, tested against one process variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowCondition {
    pub variable: String,
    pub condition: Condition,
}

impl FlowCondition {
    pub fn new(variable: impl Into<String>, condition: Condition) -> Self {
        Self {
            variable: variable.into(),
            condition,
        }
    }

    /// Missing variables test as null
    pub fn evaluate(&self, variables: &Variables) -> Result<bool, String> {
        let value = variables.get(&self.variable).unwrap_or(&Value::Null);
        self.condition.evaluate(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
    pub condition: Option<FlowCondition>,
}

/// A deployed process graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub id: String,
    pub key: String,
    pub version: u32,
    pub name: Option<String>,
    pub start_node_id: String,
    pub(crate) nodes: HashMap<String, FlowNode>,
    pub(crate) flows: HashMap<String, SequenceFlow>,
}

impl ProcessDefinition {
    pub fn definition_id(key: &str, version: u32) -> String {
        format!("{key}:{version}")
    }

    pub(crate) fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self.id = Self::definition_id(&self.key, version);
        self
    }

    pub fn node(&self, node_id: &str) -> Option<&FlowNode> {
        self.nodes.get(node_id)
    }

    /// Node lookup for a running execution; a missing node means the tree is
    /// inconsistent with its definition
    pub fn require_node(&self, node_id: &str) -> EngineResult<&FlowNode> {
        self.nodes.get(node_id).ok_or_else(|| {
            data_integrity(
                format!("node '{node_id}' does not exist in process definition '{}'", self.id),
                None,
                Some(node_id),
            )
        })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.values()
    }

    pub fn flow(&self, flow_id: &str) -> Option<&SequenceFlow> {
        self.flows.get(flow_id)
    }

    pub fn incoming_flows(&self, node: &FlowNode) -> Vec<&SequenceFlow> {
        node.incoming.iter().filter_map(|id| self.flows.get(id)).collect()
    }

    pub fn outgoing_flows(&self, node: &FlowNode) -> Vec<&SequenceFlow> {
        node.outgoing.iter().filter_map(|id| self.flows.get(id)).collect()
    }

    /// The event-based gateway feeding `node` through its single incoming flow
    pub fn preceding_event_gateway(&self, node: &FlowNode) -> Option<&FlowNode> {
        match node.incoming.as_slice() {
            [only] => self
                .flows
                .get(only)
                .and_then(|flow| self.nodes.get(&flow.source))
                .filter(|source| source.kind == NodeKind::EventBasedGateway),
            _ => None,
        }
    }

    /// Check structural rules of the graph
    pub fn validate(&self) -> EngineResult<()> {
        if self.key.trim().is_empty() {
            return Err(invalid_argument("process definition key must not be empty"));
        }

        let starts: Vec<&FlowNode> = self
            .nodes
            .values()
            .filter(|n| n.kind == NodeKind::StartEvent)
            .collect();
        if starts.len() != 1 {
            return Err(invalid_argument(format!(
                "process '{}' must have exactly one start event, found {}",
                self.key,
                starts.len()
            )));
        }
        if starts[0].id != self.start_node_id {
            return Err(invalid_argument(format!(
                "start node '{}' is not the start event of process '{}'",
                self.start_node_id, self.key
            )));
        }

        for flow in self.flows.values() {
            for end in [&flow.source, &flow.target] {
                if !self.nodes.contains_key(end) {
                    return Err(invalid_argument(format!(
                        "flow '{}' references unknown node '{end}'",
                        flow.id
                    )));
                }
            }
        }

        for node in self.nodes.values() {
            if node.id.trim().is_empty() {
                return Err(invalid_argument("node ids must not be empty"));
            }
            self.validate_node(node)?;
        }
        Ok(())
    }

    fn validate_node(&self, node: &FlowNode) -> EngineResult<()> {
        match &node.kind {
            NodeKind::StartEvent if !node.incoming.is_empty() => Err(invalid_argument(format!(
                "start event '{}' must not have incoming flows",
                node.id
            ))),
            NodeKind::EndEvent if !node.outgoing.is_empty() => Err(invalid_argument(format!(
                "end event '{}' must not have outgoing flows",
                node.id
            ))),
            NodeKind::EventBasedGateway => {
                if node.outgoing.len() < 2 {
                    return Err(invalid_argument(format!(
                        "event-based gateway '{}' needs at least two outgoing flows",
                        node.id
                    )));
                }
                let mut targets = HashSet::new();
                for flow in self.outgoing_flows(node) {
                    let target = self.nodes.get(&flow.target);
                    let valid = target.is_some_and(|t| {
                        matches!(t.kind, NodeKind::IntermediateCatchEvent { .. })
                            && t.incoming.len() == 1
                    });
                    if !valid || !targets.insert(flow.target.as_str()) {
                        return Err(invalid_argument(format!(
                            "event-based gateway '{}' may only lead to distinct catch events with a single incoming flow, '{}' is not one",
                            node.id, flow.target
                        )));
                    }
                }
                Ok(())
            }
            NodeKind::ExclusiveGateway {
                default_flow: Some(default_flow),
            } if !node.outgoing.contains(default_flow) => Err(invalid_argument(format!(
                "default flow '{default_flow}' is not an outgoing flow of exclusive gateway '{}'",
                node.id
            ))),
            NodeKind::BusinessRuleTask {
                decision_key,
                result_variable,
                ..
            } if decision_key.trim().is_empty() || result_variable.trim().is_empty() => {
                Err(invalid_argument(format!(
                    "business rule task '{}' needs a decision key and a result variable",
                    node.id
                )))
            }
            _ => Ok(()),
        }
    }
}
