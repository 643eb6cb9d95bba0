//! # Engine Bootstrap
//!
//! Wires configuration, persistence, definitions, decisions and the command
//! pipeline into a [`ProcessEngine`].
//!
//! ```rust
//! use process_engine::engine::ProcessEngine;
//!
//! let engine = ProcessEngine::builder().build().unwrap();
//! assert_eq!(
//!     engine.executor().interceptor_names(),
//!     vec![
//!         "LogInterceptor",
//!         "RetryInterceptor",
//!         "CommandContextInterceptor",
//!         "TransactionContextInterceptor",
//!         "CommandInvoker",
//!     ]
//! );
//! ```

use crate::command::interceptors::{
    CommandContextInterceptor, CommandInvoker, LogInterceptor, RetryInterceptor,
    TransactionContextInterceptor,
};
use crate::command::{
    BackendTransactionFactory, CommandConfig, CommandExecutor, CommandInterceptor,
    TransactionBoundaryFactory,
};
use crate::config::EngineConfig;
use crate::decision::{DecisionEvaluator, DecisionRepository, RuleTableEvaluator};
use crate::definition::{DefinitionProvider, DefinitionRepository};
use crate::error::EngineResult;
use crate::events::{EngineEvent, EventPublisher};
use crate::persistence::{InMemoryBackend, PersistenceBackend};
use crate::services::{DecisionService, HistoryService, RepositoryService, RuntimeService};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Collaborators shared by every command context
pub struct EngineServices {
    pub config: Arc<EngineConfig>,
    pub backend: Arc<dyn PersistenceBackend>,
    pub definitions: Arc<dyn DefinitionProvider>,
    pub decisions: Arc<dyn DecisionEvaluator>,
    pub events: EventPublisher,
}

impl std::fmt::Debug for EngineServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineServices")
            .field("config", &self.config)
            .field("event_subscribers", &self.events.subscriber_count())
            .finish()
    }
}

/// A running engine: the command executor plus the services built on it
#[derive(Clone)]
pub struct ProcessEngine {
    services: Arc<EngineServices>,
    executor: CommandExecutor,
    definition_repository: Arc<DefinitionRepository>,
    decision_repository: Arc<DecisionRepository>,
}

impl std::fmt::Debug for ProcessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessEngine")
            .field("executor", &self.executor)
            .field("definitions", &self.definition_repository.count())
            .finish()
    }
}

impl ProcessEngine {
    pub fn builder() -> ProcessEngineBuilder {
        ProcessEngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.services.config
    }

    pub fn services(&self) -> &Arc<EngineServices> {
        &self.services
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn runtime_service(&self) -> RuntimeService {
        RuntimeService::new(self.executor.clone())
    }

    pub fn decision_service(&self) -> DecisionService {
        DecisionService::new(self.executor.clone())
    }

    pub fn repository_service(&self) -> RepositoryService {
        RepositoryService::new(
            self.definition_repository.clone(),
            self.decision_repository.clone(),
        )
    }

    pub fn history_service(&self) -> HistoryService {
        HistoryService::new(self.executor.clone())
    }

    /// Receive engine events published after each successful commit
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.services.events.subscribe()
    }
}

/// Builder for [`ProcessEngine`]
///
/// Anything left unset falls back to the defaults: [`EngineConfig::default`], an
/// [`InMemoryBackend`], a backend transaction factory (unless transactions are
/// disabled in the config) and the rule-table decision evaluator.
#[derive(Default)]
pub struct ProcessEngineBuilder {
    config: Option<EngineConfig>,
    backend: Option<Arc<dyn PersistenceBackend>>,
    transaction_factory: Option<Arc<dyn TransactionBoundaryFactory>>,
    decision_evaluator: Option<Arc<dyn DecisionEvaluator>>,
    custom_interceptors: Vec<Arc<dyn CommandInterceptor>>,
}

impl ProcessEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn PersistenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replace the transaction factory; ignored when transactions are disabled
    pub fn transaction_factory(mut self, factory: Arc<dyn TransactionBoundaryFactory>) -> Self {
        self.transaction_factory = Some(factory);
        self
    }

    pub fn decision_evaluator(mut self, evaluator: Arc<dyn DecisionEvaluator>) -> Self {
        self.decision_evaluator = Some(evaluator);
        self
    }

    /// Add an interceptor that runs after retry and before the context is established
    pub fn interceptor(mut self, interceptor: Arc<dyn CommandInterceptor>) -> Self {
        self.custom_interceptors.push(interceptor);
        self
    }

    pub fn build(self) -> EngineResult<ProcessEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let config = Arc::new(config);

        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(InMemoryBackend::new()));
        let definition_repository = Arc::new(DefinitionRepository::new());
        let decision_repository = Arc::new(DecisionRepository::new());
        let decisions = self
            .decision_evaluator
            .unwrap_or_else(|| Arc::new(RuleTableEvaluator::new(decision_repository.clone())));

        let services = Arc::new(EngineServices {
            config: config.clone(),
            backend: backend.clone(),
            definitions: definition_repository.clone(),
            decisions,
            events: EventPublisher::new(config.events.channel_capacity),
        });

        let transaction_factory = if config.command.transactions_enabled {
            Some(
                self.transaction_factory
                    .unwrap_or_else(|| Arc::new(BackendTransactionFactory::new(backend.clone()))),
            )
        } else {
            None
        };

        let mut chain: Vec<Arc<dyn CommandInterceptor>> = vec![
            Arc::new(LogInterceptor),
            Arc::new(RetryInterceptor::new(config.retry.clone())),
        ];
        chain.extend(self.custom_interceptors);
        chain.push(Arc::new(CommandContextInterceptor::new(services.clone())));
        chain.push(Arc::new(TransactionContextInterceptor::new(transaction_factory)));
        chain.push(Arc::new(CommandInvoker));

        let executor = CommandExecutor::new(chain, CommandConfig::from_settings(&config.command));
        info!(
            interceptors = ?executor.interceptor_names(),
            transactions_enabled = config.command.transactions_enabled,
            history_enabled = config.history.enabled,
            "✅ Process engine built"
        );

        Ok(ProcessEngine {
            services,
            executor,
            definition_repository,
            decision_repository,
        })
    }
}
