use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of event a waiting execution is subscribed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Signal,
    Message,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => write!(f, "signal"),
            Self::Message => write!(f, "message"),
        }
    }
}

/// Related record owned by an execution waiting at a catch event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSubscription {
    pub id: Uuid,
    pub event_type: EventType,
    pub event_name: String,
    pub execution_id: Uuid,
    pub process_instance_id: Uuid,
    pub node_id: String,
    pub created_at: DateTime<Utc>,
}

impl EventSubscription {
    pub fn new(
        event_type: EventType,
        event_name: impl Into<String>,
        execution_id: Uuid,
        process_instance_id: Uuid,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            event_name: event_name.into(),
            execution_id,
            process_instance_id,
            node_id: node_id.into(),
            created_at: Utc::now(),
        }
    }
}
