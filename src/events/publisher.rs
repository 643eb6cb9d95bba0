use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Lifecycle event produced while a command ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub name: String,
    pub process_instance_id: Option<Uuid>,
    pub execution_id: Option<Uuid>,
    pub node_id: Option<String>,
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

impl EngineEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            process_instance_id: None,
            execution_id: None,
            node_id: None,
            payload: Value::Null,
            published_at: Utc::now(),
        }
    }

    pub fn with_process_instance(mut self, id: Uuid) -> Self {
        self.process_instance_id = Some(id);
        self
    }

    pub fn with_execution(mut self, id: Uuid, node_id: Option<&str>) -> Self {
        self.execution_id = Some(id);
        self.node_id = node_id.map(str::to_string);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Broadcast publisher for committed engine events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) {
        let name = event.name.clone();
        if self.sender.send(event).is_err() {
            trace!(event = %name, "No subscribers for engine event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
