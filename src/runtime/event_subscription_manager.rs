use crate::command::CommandContext;
use crate::error::EngineResult;
use crate::models::{EventSubscription, EventType, ExecutionEntity};
use tracing::debug;
use uuid::Uuid;

/// Event subscriptions owned by executions waiting at catch events
pub struct EventSubscriptionManager;

impl EventSubscriptionManager {
    pub fn create(
        ctx: &mut CommandContext,
        execution: &ExecutionEntity,
        node_id: &str,
        event_type: EventType,
        event_name: &str,
    ) -> EngineResult<EventSubscription> {
        let subscription = EventSubscription::new(
            event_type,
            event_name,
            execution.id,
            execution.process_instance_id,
            node_id,
        );
        ctx.db_session()?.insert_subscription(subscription.clone());
        debug!(
            execution_id = %execution.id,
            node_id,
            event_type = %event_type,
            event_name,
            "Created event subscription"
        );
        Ok(subscription)
    }

    pub async fn find_by_execution(
        ctx: &mut CommandContext,
        execution_id: Uuid,
    ) -> EngineResult<Vec<EventSubscription>> {
        Ok(ctx
            .db_session()?
            .find_subscriptions_by_execution(execution_id)
            .await?)
    }

    pub async fn find_by_event(
        ctx: &mut CommandContext,
        event_type: EventType,
        event_name: &str,
    ) -> EngineResult<Vec<EventSubscription>> {
        Ok(ctx
            .db_session()?
            .find_subscriptions_by_event(event_type, event_name)
            .await?)
    }

    /// Remove every subscription of an execution; returns how many were removed
    pub async fn delete_for_execution(
        ctx: &mut CommandContext,
        execution_id: Uuid,
    ) -> EngineResult<usize> {
        let session = ctx.db_session()?;
        let subscriptions = session.find_subscriptions_by_execution(execution_id).await?;
        for subscription in &subscriptions {
            session.delete_subscription(subscription.id);
        }
        Ok(subscriptions.len())
    }
}
