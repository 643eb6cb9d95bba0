use super::model::ProcessDefinition;
use crate::error::EngineResult;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Read access to deployed definitions; definitions never change once deployed
pub trait DefinitionProvider: Send + Sync {
    fn find_by_id(&self, definition_id: &str) -> Option<Arc<ProcessDefinition>>;

    /// Latest deployed version for a key
    fn find_latest_by_key(&self, key: &str) -> Option<Arc<ProcessDefinition>>;
}

/// Concurrent in-process store of deployed definitions
#[derive(Debug, Default)]
pub struct DefinitionRepository {
    by_id: DashMap<String, Arc<ProcessDefinition>>,
    latest_by_key: DashMap<String, Arc<ProcessDefinition>>,
}

impl DefinitionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy a definition as the next version of its key
    pub fn deploy(&self, definition: ProcessDefinition) -> EngineResult<Arc<ProcessDefinition>> {
        definition.validate()?;

        let deployed = match self.latest_by_key.entry(definition.key.clone()) {
            Entry::Occupied(mut occupied) => {
                let version = occupied.get().version + 1;
                let deployed = Arc::new(definition.with_version(version));
                occupied.insert(deployed.clone());
                deployed
            }
            Entry::Vacant(vacant) => {
                let deployed = Arc::new(definition.with_version(1));
                vacant.insert(deployed.clone());
                deployed
            }
        };

        self.by_id.insert(deployed.id.clone(), deployed.clone());
        info!(
            definition_id = %deployed.id,
            key = %deployed.key,
            version = deployed.version,
            "Deployed process definition"
        );
        Ok(deployed)
    }

    pub fn count(&self) -> usize {
        self.by_id.len()
    }
}

impl DefinitionProvider for DefinitionRepository {
    fn find_by_id(&self, definition_id: &str) -> Option<Arc<ProcessDefinition>> {
        self.by_id.get(definition_id).map(|entry| entry.value().clone())
    }

    fn find_latest_by_key(&self, key: &str) -> Option<Arc<ProcessDefinition>> {
        self.latest_by_key.get(key).map(|entry| entry.value().clone())
    }
}
