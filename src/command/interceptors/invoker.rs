use crate::command::{BoxedOutput, CommandConfig, CommandInterceptor, ErasedCommand, Invocation, Next};
use crate::error::EngineResult;
use crate::operations;
use async_trait::async_trait;

/// Final stage: runs the command body, then drains the agenda it planned
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandInvoker;

#[async_trait]
impl CommandInterceptor for CommandInvoker {
    fn name(&self) -> &'static str {
        "CommandInvoker"
    }

    async fn execute(
        &self,
        _config: &CommandConfig,
        command: &dyn ErasedCommand,
        invocation: &mut Invocation<'_>,
        _next: Next<'_>,
    ) -> EngineResult<BoxedOutput> {
        let ctx = invocation.require_context()?;
        let output = command.execute_boxed(ctx).await?;
        operations::run_agenda(ctx).await?;
        Ok(output)
    }
}
