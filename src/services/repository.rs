use crate::decision::{DecisionRepository, DecisionTable};
use crate::definition::{DefinitionProvider, DefinitionRepository, ProcessDefinition};
use crate::error::EngineResult;
use std::sync::Arc;

/// Deployment of process definitions and decision tables
///
/// Deployments are held in memory and do not pass through the command pipeline.
#[derive(Debug, Clone)]
pub struct RepositoryService {
    definitions: Arc<DefinitionRepository>,
    decisions: Arc<DecisionRepository>,
}

impl RepositoryService {
    pub fn new(definitions: Arc<DefinitionRepository>, decisions: Arc<DecisionRepository>) -> Self {
        Self {
            definitions,
            decisions,
        }
    }

    /// Deploy a definition; redeploying a key creates the next version
    pub fn deploy(&self, definition: ProcessDefinition) -> EngineResult<Arc<ProcessDefinition>> {
        self.definitions.deploy(definition)
    }

    pub fn deploy_decision(&self, table: DecisionTable) -> EngineResult<Arc<DecisionTable>> {
        self.decisions.deploy(table)
    }

    pub fn find_definition(&self, definition_id: &str) -> Option<Arc<ProcessDefinition>> {
        self.definitions.find_by_id(definition_id)
    }

    pub fn find_latest_definition(&self, key: &str) -> Option<Arc<ProcessDefinition>> {
        self.definitions.find_latest_by_key(key)
    }

    pub fn find_decision(&self, decision_key: &str) -> Option<Arc<DecisionTable>> {
        self.decisions.find(decision_key)
    }
}
