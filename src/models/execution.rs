use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Process variables keyed by name
pub type Variables = Map<String, Value>;

/// A persisted token positioned somewhere in a running process instance
///
/// The root execution of an instance is its scope: it has no parent, is not
/// positioned at a node and owns the process variables. Every concurrent path is a
/// child of the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEntity {
    pub id: Uuid,
    pub process_instance_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub process_definition_id: String,
    pub business_key: Option<String>,
    pub current_node_id: Option<String>,
    pub is_active: bool,
    pub is_scope: bool,
    pub variables: Variables,
    /// Optimistic-locking revision, bumped by the backend on every update
    pub revision: u64,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a new execution
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub process_instance_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub process_definition_id: String,
    pub business_key: Option<String>,
    pub current_node_id: Option<String>,
    pub is_scope: bool,
    pub variables: Variables,
}

impl ExecutionEntity {
    /// Build an entity from creation parameters; revision starts at zero
    pub fn create(new_execution: NewExecution) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            process_instance_id: new_execution.process_instance_id.unwrap_or(id),
            parent_id: new_execution.parent_id,
            process_definition_id: new_execution.process_definition_id,
            business_key: new_execution.business_key,
            current_node_id: new_execution.current_node_id,
            is_active: true,
            is_scope: new_execution.is_scope,
            variables: new_execution.variables,
            revision: 0,
            created_at: Utc::now(),
        }
    }

    /// Whether this is the root (process instance) execution
    pub fn is_process_instance(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn current_node_id(&self) -> Option<&str> {
        self.current_node_id.as_deref()
    }

    /// Whether the execution is positioned at one of `node_ids`
    pub fn is_at_any(&self, node_ids: &std::collections::HashSet<String>) -> bool {
        self.current_node_id
            .as_ref()
            .is_some_and(|node| node_ids.contains(node))
    }

    /// Merge a JSON object into the variables; non-object payloads are ignored
    pub fn merge_variables(&mut self, payload: &Value) -> bool {
        match payload {
            Value::Object(map) => {
                for (k, v) in map {
                    self.variables.insert(k.clone(), v.clone());
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn root() -> ExecutionEntity {
        ExecutionEntity::create(NewExecution {
            process_instance_id: None,
            parent_id: None,
            process_definition_id: "order:1".to_string(),
            business_key: None,
            current_node_id: None,
            is_scope: true,
            variables: Variables::new(),
        })
    }

    #[test]
    fn test_root_is_its_own_process_instance() {
        let root = root();
        assert_eq!(root.id, root.process_instance_id);
        assert!(root.is_process_instance());
        assert_eq!(root.revision, 0);
    }

    #[test]
    fn test_is_at_any() {
        let mut child = root();
        child.parent_id = Some(Uuid::new_v4());
        child.current_node_id = Some("catchA".to_string());
        let ids: HashSet<String> = ["catchA".to_string()].into_iter().collect();
        assert!(child.is_at_any(&ids));
        child.current_node_id = None;
        assert!(!child.is_at_any(&ids));
    }

    #[test]
    fn test_merge_variables_only_accepts_objects() {
        let mut root = root();
        assert!(root.merge_variables(&json!({"approved": true})));
        assert!(!root.merge_variables(&json!([1, 2])));
        assert_eq!(root.variables.get("approved"), Some(&json!(true)));
    }
}
