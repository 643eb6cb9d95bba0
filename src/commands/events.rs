//! Delivery of signals and messages to waiting executions.

use crate::command::{Command, CommandContext};
use crate::error::{invalid_argument, require_id, EngineError, EngineResult};
use crate::models::EventType;
use crate::runtime::EventSubscriptionManager;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

/// Broadcast a signal to every execution subscribed to it
///
/// Returns the number of executions the signal was delivered to. When two
/// subscribers race behind the same event-based gateway, the first one cancels
/// the other and the second delivery is skipped.
#[derive(Debug, Clone)]
pub struct SignalEventReceivedCmd {
    pub signal_name: String,
    pub payload: Option<Value>,
}

#[async_trait]
impl Command for SignalEventReceivedCmd {
    type Output = usize;

    fn name(&self) -> &'static str {
        "SignalEventReceivedCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<usize> {
        let signal_name = require_id("signal name", Some(&self.signal_name))?;
        validate_payload(self.payload.as_ref())?;

        let subscriptions =
            EventSubscriptionManager::find_by_event(ctx, EventType::Signal, &signal_name).await?;
        for subscription in &subscriptions {
            ctx.agenda_mut().plan_trigger(
                subscription.execution_id,
                Some(signal_name.clone()),
                self.payload.clone(),
            );
        }
        info!(signal = %signal_name, receivers = subscriptions.len(), "Signal received");
        Ok(subscriptions.len())
    }
}

/// Deliver a message to exactly one subscribed execution
///
/// With `execution_id` set only that execution's subscription qualifies.
/// Returns the execution the message was delivered to.
#[derive(Debug, Clone)]
pub struct MessageEventReceivedCmd {
    pub message_name: String,
    pub execution_id: Option<Uuid>,
    pub payload: Option<Value>,
}

#[async_trait]
impl Command for MessageEventReceivedCmd {
    type Output = Uuid;

    fn name(&self) -> &'static str {
        "MessageEventReceivedCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<Uuid> {
        let message_name = require_id("message name", Some(&self.message_name))?;
        validate_payload(self.payload.as_ref())?;

        let subscription = EventSubscriptionManager::find_by_event(ctx, EventType::Message, &message_name)
            .await?
            .into_iter()
            .find(|s| self.execution_id.map_or(true, |id| s.execution_id == id))
            .ok_or_else(|| EngineError::NotFound {
                entity: "message subscription",
                id: match self.execution_id {
                    Some(id) => format!("{message_name}@{id}"),
                    None => message_name.clone(),
                },
            })?;

        debug!(
            message = %message_name,
            execution_id = %subscription.execution_id,
            node_id = %subscription.node_id,
            "Message correlated"
        );
        ctx.agenda_mut().plan_trigger(
            subscription.execution_id,
            Some(message_name),
            self.payload.clone(),
        );
        Ok(subscription.execution_id)
    }
}

fn validate_payload(payload: Option<&Value>) -> EngineResult<()> {
    match payload {
        Some(value) if !value.is_object() => Err(invalid_argument("event payload must be a JSON object")),
        _ => Ok(()),
    }
}
