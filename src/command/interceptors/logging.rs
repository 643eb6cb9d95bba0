use crate::command::{BoxedOutput, CommandConfig, CommandInterceptor, ErasedCommand, Invocation, Next};
use crate::error::EngineResult;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

/// Opens a tracing span per invocation and logs the outcome
#[derive(Debug, Default, Clone, Copy)]
pub struct LogInterceptor;

#[async_trait]
impl CommandInterceptor for LogInterceptor {
    fn name(&self) -> &'static str {
        "LogInterceptor"
    }

    async fn execute(
        &self,
        config: &CommandConfig,
        command: &dyn ErasedCommand,
        invocation: &mut Invocation<'_>,
        next: Next<'_>,
    ) -> EngineResult<BoxedOutput> {
        let nested = invocation.has_context();
        let span = info_span!("command", command = command.name(), nested);
        let started = Instant::now();

        let result = next
            .run(config, command, invocation)
            .instrument(span.clone())
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let _entered = span.enter();
        match &result {
            Ok(_) => debug!(elapsed_ms, "Command completed"),
            Err(e) => warn!(elapsed_ms, kind = %e.kind(), error = %e, "Command failed"),
        }
        result
    }
}
