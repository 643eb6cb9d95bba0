//! Interceptor chain and the executor that drives commands through it.

use super::context::CommandContext;
use super::{BoxedOutput, Command, CommandConfig, ErasedCommand};
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

/// One stage of the command pipeline
///
/// An interceptor either handles the command itself or hands it on with
/// [`Next::run`]. The last stage must never call `next`.
#[async_trait]
pub trait CommandInterceptor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        config: &CommandConfig,
        command: &dyn ErasedCommand,
        invocation: &mut Invocation<'_>,
        next: Next<'_>,
    ) -> EngineResult<BoxedOutput>;
}

/// State of one trip through the chain
///
/// `context` is `None` until the context interceptor creates the unit of work, or
/// already set when the invocation is nested inside a running command.
pub struct Invocation<'a> {
    context: Option<&'a mut CommandContext>,
    executor: CommandExecutor,
    attempt: u32,
}

impl<'a> Invocation<'a> {
    pub(crate) fn top_level(executor: CommandExecutor) -> Self {
        Self {
            context: None,
            executor,
            attempt: 1,
        }
    }

    pub(crate) fn within(context: &'a mut CommandContext, executor: CommandExecutor) -> Self {
        let attempt = context.attempt();
        Self {
            context: Some(context),
            executor,
            attempt,
        }
    }

    /// Whether a command context is already active for this invocation
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    pub fn context(&mut self) -> Option<&mut CommandContext> {
        self.context.as_deref_mut()
    }

    pub fn require_context(&mut self) -> EngineResult<&mut CommandContext> {
        self.context.as_deref_mut().ok_or_else(|| {
            EngineError::Internal("no command context is active for this invocation".to_string())
        })
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn set_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }
}

/// The remainder of the chain after the current interceptor
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn CommandInterceptor>],
}

impl<'a> Next<'a> {
    fn new(chain: &'a [Arc<dyn CommandInterceptor>]) -> Self {
        Self { chain }
    }

    /// Number of interceptors still to run
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }

    pub fn run<'b>(
        self,
        config: &'b CommandConfig,
        command: &'b dyn ErasedCommand,
        invocation: &'b mut Invocation<'_>,
    ) -> BoxFuture<'b, EngineResult<BoxedOutput>>
    where
        'a: 'b,
    {
        match self.chain.split_first() {
            Some((head, rest)) => head.execute(config, command, invocation, Next::new(rest)),
            None => {
                let name = command.name();
                futures::future::ready(Err(EngineError::Internal(format!(
                    "interceptor chain ended before command '{name}' was invoked"
                ))))
                .boxed()
            }
        }
    }
}

/// Entry point that runs commands through the configured interceptor chain
#[derive(Clone)]
pub struct CommandExecutor {
    chain: Arc<[Arc<dyn CommandInterceptor>]>,
    default_config: CommandConfig,
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("chain", &self.interceptor_names())
            .field("default_config", &self.default_config)
            .finish()
    }
}

impl CommandExecutor {
    pub fn new(interceptors: Vec<Arc<dyn CommandInterceptor>>, default_config: CommandConfig) -> Self {
        Self {
            chain: interceptors.into(),
            default_config,
        }
    }

    pub fn default_config(&self) -> &CommandConfig {
        &self.default_config
    }

    pub fn interceptor_names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|i| i.name()).collect()
    }

    /// Run a command with the default configuration
    pub async fn execute<C>(&self, command: C) -> EngineResult<C::Output>
    where
        C: Command + 'static,
    {
        let config = self.default_config.clone();
        self.execute_with_config(&config, command).await
    }

    /// Run a command as a top-level invocation
    pub async fn execute_with_config<C>(
        &self,
        config: &CommandConfig,
        command: C,
    ) -> EngineResult<C::Output>
    where
        C: Command + 'static,
    {
        let mut invocation = Invocation::top_level(self.clone());
        let output = Next::new(&self.chain)
            .run(config, &command, &mut invocation)
            .await?;
        Self::downcast(&command, output)
    }

    /// Run a command inside an already active context
    pub(crate) async fn execute_in_context<C>(
        &self,
        ctx: &mut CommandContext,
        config: &CommandConfig,
        command: C,
    ) -> EngineResult<C::Output>
    where
        C: Command + 'static,
    {
        let mut invocation = Invocation::within(ctx, self.clone());
        let output = Next::new(&self.chain)
            .run(config, &command, &mut invocation)
            .await?;
        Self::downcast(&command, output)
    }

    fn downcast<C>(command: &C, output: BoxedOutput) -> EngineResult<C::Output>
    where
        C: Command + 'static,
    {
        output.downcast::<C::Output>().map(|boxed| *boxed).map_err(|_| {
            EngineError::Internal(format!(
                "command '{}' produced an output of unexpected type",
                Command::name(command)
            ))
        })
    }
}
