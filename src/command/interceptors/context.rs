use crate::command::{
    BoxedOutput, CommandConfig, CommandContext, CommandInterceptor, ErasedCommand, Invocation, Next,
};
use crate::engine::EngineServices;
use crate::error::{illegal_state, EngineResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Creates the command context for top-level invocations and lets nested ones
/// join it
pub struct CommandContextInterceptor {
    services: Arc<EngineServices>,
}

impl CommandContextInterceptor {
    pub fn new(services: Arc<EngineServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl CommandInterceptor for CommandContextInterceptor {
    fn name(&self) -> &'static str {
        "CommandContextInterceptor"
    }

    async fn execute(
        &self,
        config: &CommandConfig,
        command: &dyn ErasedCommand,
        invocation: &mut Invocation<'_>,
        next: Next<'_>,
    ) -> EngineResult<BoxedOutput> {
        if let Some(ctx) = invocation.context() {
            if !config.context_reuse_possible {
                return Err(illegal_state(format!(
                    "command '{}' may not run inside active command context {}",
                    command.name(),
                    ctx.id()
                )));
            }
            ctx.enter_nested();
            debug!(
                context_id = %ctx.id(),
                depth = ctx.nesting_depth(),
                command = command.name(),
                "Reusing command context"
            );

            let result = next.run(config, command, invocation).await;

            let ctx = invocation.require_context()?;
            ctx.exit_nested();
            if let Err(e) = &result {
                ctx.mark_nested_failure(e);
            }
            return result;
        }

        let mut ctx = CommandContext::new(
            self.services.clone(),
            invocation.executor().clone(),
            invocation.attempt(),
        );
        debug!(context_id = %ctx.id(), command = command.name(), "Opened command context");

        let result = {
            let mut inner = Invocation::within(&mut ctx, invocation.executor().clone());
            next.run(config, command, &mut inner).await
        };

        let closed = ctx.close(result.as_ref().err()).await;
        match (result, closed) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(output), Ok(())) => Ok(output),
        }
    }
}
