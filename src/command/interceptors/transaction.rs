use crate::command::{
    BoxedOutput, CommandConfig, CommandInterceptor, ErasedCommand, Invocation, Next,
    TransactionBoundaryFactory, TransactionCloseListener,
};
use crate::error::EngineResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Brackets a freshly created command context with a transaction boundary
///
/// Reused contexts already belong to an outer boundary and pass straight through.
/// Without a factory the interceptor does nothing and the context applies its
/// changes directly when it closes.
pub struct TransactionContextInterceptor {
    factory: Option<Arc<dyn TransactionBoundaryFactory>>,
}

impl TransactionContextInterceptor {
    pub fn new(factory: Option<Arc<dyn TransactionBoundaryFactory>>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl CommandInterceptor for TransactionContextInterceptor {
    fn name(&self) -> &'static str {
        "TransactionContextInterceptor"
    }

    async fn execute(
        &self,
        config: &CommandConfig,
        command: &dyn ErasedCommand,
        invocation: &mut Invocation<'_>,
        next: Next<'_>,
    ) -> EngineResult<BoxedOutput> {
        let ctx = invocation.require_context()?;
        let is_reused = ctx.is_reused();

        let opened = match &self.factory {
            Some(factory) if !is_reused => {
                let transaction = factory.open_transaction(ctx)?;
                ctx.set_transaction(transaction.clone())?;
                ctx.add_close_listener(Box::new(TransactionCloseListener::new(transaction.clone())));
                debug!(
                    context_id = %ctx.id(),
                    transaction_id = %transaction.id(),
                    command = command.name(),
                    "Opened transaction boundary"
                );
                true
            }
            _ => false,
        };

        let result = next.run(config, command, invocation).await;

        if opened {
            if let Some(ctx) = invocation.context() {
                ctx.clear_transaction();
            }
        }
        result
    }
}
