//! Shared fixtures: engines, process graphs and seeding commands.

use async_trait::async_trait;
use parking_lot::Mutex;
use process_engine::command::{
    BackendTransactionFactory, Command, CommandContext, TransactionBoundary,
    TransactionBoundaryFactory, TransactionState,
};
use process_engine::definition::{ProcessDefinition, ProcessDefinitionBuilder};
use process_engine::error::{EngineError, EngineResult};
use process_engine::models::{ExecutionEntity, Variables};
use process_engine::persistence::{ChangeSet, InMemoryBackend};
use process_engine::runtime::ExecutionEntityManager;
use process_engine::{EngineConfig, ProcessEngine};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Engine over a fresh in-memory backend with short retry delays
pub fn test_engine() -> (ProcessEngine, InMemoryBackend) {
    test_engine_with(EngineConfig::default(), None)
}

pub fn test_engine_with(
    config: EngineConfig,
    factory: Option<Arc<dyn TransactionBoundaryFactory>>,
) -> (ProcessEngine, InMemoryBackend) {
    let backend = InMemoryBackend::new();
    (engine_on(&backend, config, factory), backend)
}

/// Engine over an existing backend, e.g. one a counting factory already wraps
pub fn engine_on(
    backend: &InMemoryBackend,
    mut config: EngineConfig,
    factory: Option<Arc<dyn TransactionBoundaryFactory>>,
) -> ProcessEngine {
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    let mut builder = ProcessEngine::builder()
        .config(config)
        .backend(Arc::new(backend.clone()));
    if let Some(factory) = factory {
        builder = builder.transaction_factory(factory);
    }
    builder.build().expect("engine should build")
}

/// start -> gateway -> {x: signal "x", y: signal "y"}; x -> after_x (user task), y -> end_y
pub fn race_process() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("race")
        .start_event("start")
        .event_gateway("gateway")
        .catch_signal("x", "x")
        .catch_signal("y", "y")
        .user_task("after_x")
        .end_event("end_x")
        .end_event("end_y")
        .flow("start", "gateway")
        .flow("gateway", "x")
        .flow("gateway", "y")
        .flow("x", "after_x")
        .flow("after_x", "end_x")
        .flow("y", "end_y")
        .build()
        .expect("race process should be valid")
}

/// Event-based gateway with none-triggered catch events `a`, `b`, `c`, `d`,
/// each followed by a user task `after_<id>`
pub fn four_way_gateway_process() -> ProcessDefinition {
    let mut builder = ProcessDefinitionBuilder::new("four_way")
        .start_event("start")
        .event_gateway("gateway")
        .end_event("end")
        .flow("start", "gateway");
    for id in ["a", "b", "c", "d"] {
        let after = format!("after_{id}");
        builder = builder
            .catch_event(id)
            .user_task(after.clone())
            .flow("gateway", id)
            .flow(id, after.clone())
            .flow(after, "end");
    }
    builder.build().expect("four-way process should be valid")
}

/// A parallel split feeding the same event-based gateway twice
pub fn doubled_gateway_process() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("doubled")
        .start_event("start")
        .parallel_gateway("fork")
        .event_gateway("gateway")
        .catch_event("a")
        .catch_event("b")
        .user_task("after_a")
        .user_task("after_b")
        .end_event("end")
        .flow("start", "fork")
        .flow("fork", "gateway")
        .flow("fork", "gateway")
        .flow("gateway", "a")
        .flow("gateway", "b")
        .flow("a", "after_a")
        .flow("b", "after_b")
        .flow("after_a", "end")
        .flow("after_b", "end")
        .build()
        .expect("doubled process should be valid")
}

pub fn user_task_process(key: &str) -> ProcessDefinition {
    ProcessDefinitionBuilder::new(key)
        .start_event("start")
        .user_task("review")
        .end_event("end")
        .flow("start", "review")
        .flow("review", "end")
        .build()
        .expect("user task process should be valid")
}

/// Children of `root` positioned at `node`
pub fn at_node<'a>(executions: &'a [ExecutionEntity], node: &str) -> Vec<&'a ExecutionEntity> {
    executions
        .iter()
        .filter(|e| e.current_node_id.as_deref() == Some(node))
        .collect()
}

/// Creates a process instance with one idle token per listed node, bypassing
/// the behaviors. Returns the root id and the token ids in the listed order.
pub struct SeedTokensCmd {
    pub definition_key: String,
    pub nodes: Vec<String>,
}

impl SeedTokensCmd {
    pub fn new(definition_key: &str, nodes: &[&str]) -> Self {
        Self {
            definition_key: definition_key.to_string(),
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[async_trait]
impl Command for SeedTokensCmd {
    type Output = (Uuid, Vec<Uuid>);

    fn name(&self) -> &'static str {
        "SeedTokensCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<(Uuid, Vec<Uuid>)> {
        let definition = ctx
            .services()
            .definitions
            .find_latest_by_key(&self.definition_key)
            .ok_or_else(|| EngineError::NotFound {
                entity: "process definition key",
                id: self.definition_key.clone(),
            })?;
        let root =
            ExecutionEntityManager::create_process_instance(ctx, &definition, None, Variables::new())?;
        let mut tokens = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            tokens.push(ExecutionEntityManager::create_child_execution(ctx, &root, node)?.id);
        }
        Ok((root.id, tokens))
    }
}

/// Runs itself nested `depth` more times, then returns the deepest depth seen
pub struct NestedCmd {
    pub depth: usize,
}

#[async_trait]
impl Command for NestedCmd {
    type Output = usize;

    fn name(&self) -> &'static str {
        "NestedCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<usize> {
        if self.depth == 0 {
            return Ok(ctx.nesting_depth());
        }
        ctx.execute_nested(NestedCmd {
            depth: self.depth - 1,
        })
        .await
    }
}

/// Transaction counters shared between a factory and the boundaries it opens
#[derive(Debug, Default)]
pub struct TransactionCounts {
    pub opened: AtomicUsize,
    pub committed: AtomicUsize,
    pub rolled_back: AtomicUsize,
}

impl TransactionCounts {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> usize {
        self.rolled_back.load(Ordering::SeqCst)
    }

    /// Boundaries that reached a terminal state
    pub fn closed(&self) -> usize {
        self.committed() + self.rolled_back()
    }
}

/// Factory that counts what happens to the backend transactions it opens
pub struct CountingTransactionFactory {
    inner: BackendTransactionFactory,
    pub counts: Arc<TransactionCounts>,
    pub opened_ids: Mutex<Vec<Uuid>>,
}

impl CountingTransactionFactory {
    pub fn new(backend: &InMemoryBackend) -> Arc<Self> {
        Arc::new(Self {
            inner: BackendTransactionFactory::new(Arc::new(backend.clone())),
            counts: Arc::new(TransactionCounts::default()),
            opened_ids: Mutex::new(Vec::new()),
        })
    }
}

impl TransactionBoundaryFactory for CountingTransactionFactory {
    fn open_transaction(&self, ctx: &CommandContext) -> EngineResult<Arc<dyn TransactionBoundary>> {
        let inner = self.inner.open_transaction(ctx)?;
        self.counts.opened.fetch_add(1, Ordering::SeqCst);
        self.opened_ids.lock().push(inner.id());
        Ok(Arc::new(CountingTransaction {
            inner,
            counts: self.counts.clone(),
        }))
    }
}

struct CountingTransaction {
    inner: Arc<dyn TransactionBoundary>,
    counts: Arc<TransactionCounts>,
}

#[async_trait]
impl TransactionBoundary for CountingTransaction {
    fn id(&self) -> Uuid {
        self.inner.id()
    }

    fn state(&self) -> TransactionState {
        self.inner.state()
    }

    fn enlist(&self, changes: ChangeSet) -> EngineResult<()> {
        self.inner.enlist(changes)
    }

    async fn commit(&self) -> EngineResult<()> {
        let result = self.inner.commit().await;
        if result.is_ok() {
            self.counts.committed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counts.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn rollback(&self) -> EngineResult<()> {
        let before = self.inner.state();
        let result = self.inner.rollback().await;
        if before == TransactionState::Active && result.is_ok() {
            self.counts.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}
