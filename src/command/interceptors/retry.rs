use crate::command::{BoxedOutput, CommandConfig, CommandInterceptor, ErasedCommand, Invocation, Next};
use crate::config::RetryConfig;
use crate::error::EngineResult;
use async_trait::async_trait;
use tracing::{info, warn};

/// Re-runs a top-level command from scratch when it fails with a retryable conflict
///
/// Each attempt gets a fresh command context and transaction. Nested invocations
/// pass straight through; only the outermost command decides to retry.
#[derive(Debug, Clone, Default)]
pub struct RetryInterceptor {
    config: RetryConfig,
}

impl RetryInterceptor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CommandInterceptor for RetryInterceptor {
    fn name(&self) -> &'static str {
        "RetryInterceptor"
    }

    async fn execute(
        &self,
        config: &CommandConfig,
        command: &dyn ErasedCommand,
        invocation: &mut Invocation<'_>,
        next: Next<'_>,
    ) -> EngineResult<BoxedOutput> {
        if invocation.has_context() || !config.retry_enabled {
            return next.run(config, command, invocation).await;
        }

        let mut attempt = 1;
        loop {
            invocation.set_attempt(attempt);
            match next.run(config, command, invocation).await {
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = self.config.delay_for_retry(attempt);
                    warn!(
                        command = command.name(),
                        attempt,
                        max_attempts = self.config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying command after conflict"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => {
                    if attempt > 1 && result.is_ok() {
                        info!(command = command.name(), attempt, "Command succeeded after retry");
                    }
                    return result;
                }
            }
        }
    }
}
