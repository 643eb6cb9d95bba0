//! Command Pipeline Tests
//!
//! Context reuse, transaction ownership, nested failure propagation and retries
//! on optimistic-locking conflicts.

mod common;

use async_trait::async_trait;
use common::strategies::nesting_depth_strategy;
use common::*;
use process_engine::command::{Command, CommandConfig, CommandContext};
use process_engine::error::{illegal_state, EngineError, EngineResult, ErrorKind};
use process_engine::models::Variables;
use process_engine::persistence::{ChangeSet, InMemoryBackend, PersistenceBackend};
use process_engine::runtime::ExecutionEntityManager;
use process_engine::EngineConfig;
use proptest::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

proptest! {
    /// Property: one boundary opened and one closed per top-level invocation,
    /// whatever the nesting depth
    #[test]
    fn exactly_one_transaction_per_top_level_invocation(depth in nesting_depth_strategy()) {
        let backend = InMemoryBackend::new();
        let factory = CountingTransactionFactory::new(&backend);
        let engine = engine_on(&backend, EngineConfig::default(), Some(factory.clone()));

        let deepest = tokio_test::block_on(engine.executor().execute(NestedCmd { depth })).unwrap();

        prop_assert_eq!(deepest, depth);
        prop_assert_eq!(factory.counts.opened(), 1);
        prop_assert_eq!(factory.counts.committed(), 1);
        prop_assert_eq!(factory.counts.closed(), 1);
    }
}

#[tokio::test]
async fn test_sequential_invocations_each_get_their_own_transaction() {
    let backend = InMemoryBackend::new();
    let factory = CountingTransactionFactory::new(&backend);
    let engine = engine_on(&backend, EngineConfig::default(), Some(factory.clone()));

    for depth in [0, 3, 1] {
        engine.executor().execute(NestedCmd { depth }).await.unwrap();
    }

    assert_eq!(factory.counts.opened(), 3);
    assert_eq!(factory.counts.committed(), 3);
    let ids = factory.opened_ids.lock().clone();
    assert_eq!(ids.iter().collect::<std::collections::HashSet<_>>().len(), 3);
}

/// Creates a process instance, then runs a nested command that fails; the
/// nested error is swallowed by the outer command
struct SwallowNestedFailureCmd;

struct FailingCmd;

#[async_trait]
impl Command for FailingCmd {
    type Output = ();

    fn name(&self) -> &'static str {
        "FailingCmd"
    }

    async fn execute(&self, _ctx: &mut CommandContext) -> EngineResult<()> {
        Err(illegal_state("nested command refuses to run"))
    }
}

#[async_trait]
impl Command for SwallowNestedFailureCmd {
    type Output = Uuid;

    fn name(&self) -> &'static str {
        "SwallowNestedFailureCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<Uuid> {
        let (root, _) = ctx.execute_nested(SeedTokensCmd::new("review", &["review"])).await?;
        let nested = ctx.execute_nested(FailingCmd).await;
        assert!(nested.is_err());
        Ok(root)
    }
}

#[tokio::test]
async fn test_nested_failure_rolls_back_the_whole_unit_of_work() {
    let backend = InMemoryBackend::new();
    let factory = CountingTransactionFactory::new(&backend);
    let engine = engine_on(&backend, EngineConfig::default(), Some(factory.clone()));
    engine
        .repository_service()
        .deploy(user_task_process("review"))
        .unwrap();

    let err = engine
        .executor()
        .execute(SwallowNestedFailureCmd)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Transaction { .. }));
    assert_eq!(backend.execution_count(), 0);
    assert_eq!(factory.counts.opened(), 1);
    assert_eq!(factory.counts.committed(), 0);
    assert_eq!(factory.counts.rolled_back(), 1);
}

#[tokio::test]
async fn test_failed_command_discards_graph_mutations() {
    struct SeedThenFail;

    #[async_trait]
    impl Command for SeedThenFail {
        type Output = ();

        fn name(&self) -> &'static str {
            "SeedThenFail"
        }

        async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<()> {
            ctx.execute_nested(SeedTokensCmd::new("review", &["review"])).await?;
            ctx.execute_nested(FailingCmd).await
        }
    }

    let (engine, backend) = test_engine();
    engine
        .repository_service()
        .deploy(user_task_process("review"))
        .unwrap();

    let err = engine.executor().execute(SeedThenFail).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert_eq!(backend.execution_count(), 0);
    assert_eq!(backend.applied_change_sets(), 0);
}

#[tokio::test]
async fn test_nested_call_refused_when_reuse_disabled() {
    struct NestWithoutReuse;

    #[async_trait]
    impl Command for NestWithoutReuse {
        type Output = ();

        fn name(&self) -> &'static str {
            "NestWithoutReuse"
        }

        async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<()> {
            let config = CommandConfig::default().with_context_reuse(false);
            ctx.execute_nested_with_config(&config, NestedCmd { depth: 0 })
                .await
                .map(|_| ())
        }
    }

    let (engine, _) = test_engine();
    let err = engine.executor().execute(NestWithoutReuse).await.unwrap_err();
    assert!(matches!(err, EngineError::IllegalState { .. }));
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[tokio::test]
async fn test_top_level_command_runs_when_reuse_disabled() {
    let (engine, _) = test_engine();
    let config = CommandConfig::default().with_context_reuse(false);
    let depth = engine
        .executor()
        .execute_with_config(&config, NestedCmd { depth: 0 })
        .await
        .unwrap();
    assert_eq!(depth, 0);
}

/// Bumps the root's stored revision behind the session's back while attempt
/// numbers are at most `interfere_until`
struct ConcurrentUpdateCmd {
    process_instance_id: Uuid,
    interfere_until: u32,
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl Command for ConcurrentUpdateCmd {
    type Output = u32;

    fn name(&self) -> &'static str {
        "ConcurrentUpdateCmd"
    }

    async fn execute(&self, ctx: &mut CommandContext) -> EngineResult<u32> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut root = ExecutionEntityManager::require(ctx, self.process_instance_id).await?;

        if ctx.attempt() <= self.interfere_until {
            let backend = ctx.services().backend.clone();
            backend
                .apply(ChangeSet {
                    updated_executions: vec![root.clone()],
                    ..Default::default()
                })
                .await?;
        }

        root.merge_variables(&json!({ "attempt": ctx.attempt() }));
        ExecutionEntityManager::update(ctx, root)?;
        Ok(ctx.attempt())
    }
}

#[tokio::test]
async fn test_conflict_is_retried_from_scratch() {
    let (engine, backend) = test_engine();
    engine
        .repository_service()
        .deploy(user_task_process("review"))
        .unwrap();
    let (root, _) = engine
        .executor()
        .execute(SeedTokensCmd::new("review", &["review"]))
        .await
        .unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let succeeded_on = engine
        .executor()
        .execute(ConcurrentUpdateCmd {
            process_instance_id: root,
            interfere_until: 1,
            attempts: attempts.clone(),
        })
        .await
        .unwrap();

    assert_eq!(succeeded_on, 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    let stored = backend.find_execution(root).await.unwrap().unwrap();
    assert_eq!(stored.variables["attempt"], json!(2));
}

#[tokio::test]
async fn test_conflict_surfaces_once_retries_are_exhausted() {
    let (engine, backend) = test_engine();
    engine
        .repository_service()
        .deploy(user_task_process("review"))
        .unwrap();
    let (root, _) = engine
        .executor()
        .execute(SeedTokensCmd::new("review", &["review"]))
        .await
        .unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let err = engine
        .executor()
        .execute(ConcurrentUpdateCmd {
            process_instance_id: root,
            interfere_until: u32::MAX,
            attempts: attempts.clone(),
        })
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(attempts.load(Ordering::SeqCst), engine.config().retry.max_attempts);
    let stored = backend.find_execution(root).await.unwrap().unwrap();
    assert!(stored.variables.get("attempt").is_none());
}

#[tokio::test]
async fn test_retries_disabled_surfaces_first_conflict() {
    let (engine, _) = test_engine();
    engine
        .repository_service()
        .deploy(user_task_process("review"))
        .unwrap();
    let (root, _) = engine
        .executor()
        .execute(SeedTokensCmd::new("review", &["review"]))
        .await
        .unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let config = CommandConfig::default().without_retries();
    let err = engine
        .executor()
        .execute_with_config(
            &config,
            ConcurrentUpdateCmd {
                process_instance_id: root,
                interfere_until: u32::MAX,
                attempts: attempts.clone(),
            },
        )
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transactions_disabled_applies_changes_on_close() {
    let mut config = EngineConfig::default();
    config.command.transactions_enabled = false;
    let (engine, backend) = test_engine_with(config, None);
    engine
        .repository_service()
        .deploy(user_task_process("review"))
        .unwrap();

    engine
        .executor()
        .execute(SeedTokensCmd::new("review", &["review"]))
        .await
        .unwrap();
    assert_eq!(backend.execution_count(), 2);
    assert_eq!(backend.applied_change_sets(), 1);
}

#[tokio::test]
async fn test_variables_untouched_by_read_only_command() {
    let (engine, backend) = test_engine();
    engine
        .repository_service()
        .deploy(user_task_process("review"))
        .unwrap();
    let (root, _) = engine
        .executor()
        .execute(SeedTokensCmd::new("review", &["review"]))
        .await
        .unwrap();
    let before = backend.applied_change_sets();

    let variables = engine.runtime_service().get_variables(root).await.unwrap();
    assert_eq!(variables, Variables::new());
    assert_eq!(backend.applied_change_sets(), before);
}
