//! Process Lifecycle Tests
//!
//! Starting, advancing and ending process instances through the runtime service.

mod common;

use common::strategies::payload_strategy;
use common::*;
use process_engine::constants::{delete_reason, events};
use process_engine::decision::{
    ArithmeticOp, Condition, DecisionTable, HitPolicy, OutputExpression, OutputType,
};
use process_engine::definition::{FlowCondition, ProcessDefinition, ProcessDefinitionBuilder};
use process_engine::error::{EngineError, ErrorKind};
use process_engine::models::Variables;
use process_engine::{EngineConfig, ProcessEngine};
use proptest::prelude::*;
use serde_json::{json, Value};

fn parallel_process() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("parallel")
        .start_event("start")
        .parallel_gateway("fork")
        .user_task("left")
        .user_task("right")
        .parallel_gateway("join")
        .end_event("end")
        .flow("start", "fork")
        .flow("fork", "left")
        .flow("fork", "right")
        .flow("left", "join")
        .flow("right", "join")
        .flow("join", "end")
        .build()
        .unwrap()
}

fn routing_process() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("routing")
        .start_event("start")
        .exclusive_gateway("route")
        .user_task("small")
        .user_task("large")
        .user_task("fallback")
        .end_event("end")
        .flow("start", "route")
        .conditional_flow(
            "to_small",
            "route",
            "small",
            FlowCondition::new("amount", Condition::less_than(100.0)),
        )
        .conditional_flow(
            "to_large",
            "route",
            "large",
            FlowCondition::new("amount", Condition::greater_or_equal(100.0)),
        )
        .flow_with_id("to_fallback", "route", "fallback")
        .default_flow("route", "to_fallback")
        .flow("small", "end")
        .flow("large", "end")
        .flow("fallback", "end")
        .build()
        .unwrap()
}

fn rule_task_process(key: &str, decision_key: &str, fail_on_error: bool) -> ProcessDefinition {
    ProcessDefinitionBuilder::new(key)
        .start_event("start")
        .business_rule_task("decide", decision_key, "bands", fail_on_error)
        .user_task("review")
        .end_event("end")
        .flow("start", "decide")
        .flow("decide", "review")
        .flow("review", "end")
        .build()
        .unwrap()
}

fn two_step_process() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("two_step")
        .start_event("start")
        .user_task("first")
        .user_task("second")
        .end_event("end")
        .flow("start", "first")
        .flow("first", "second")
        .flow("second", "end")
        .build()
        .unwrap()
}

fn payment_process() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("payment")
        .start_event("start")
        .catch_message("wait_payment", "paid")
        .user_task("ship")
        .end_event("end")
        .flow("start", "wait_payment")
        .flow("wait_payment", "ship")
        .flow("ship", "end")
        .build()
        .unwrap()
}

/// Waits for input before running a mandatory decision
fn gated_rule_process() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("gated")
        .start_event("start")
        .user_task("collect")
        .business_rule_task("decide", "halving", "half", true)
        .user_task("review")
        .end_event("end")
        .flow("start", "collect")
        .flow("collect", "decide")
        .flow("decide", "review")
        .flow("review", "end")
        .build()
        .unwrap()
}

/// The only way out of `work` is guarded by a condition
fn guarded_process() -> ProcessDefinition {
    ProcessDefinitionBuilder::new("guarded")
        .start_event("start")
        .task("work")
        .user_task("approve")
        .end_event("end")
        .flow("start", "work")
        .conditional_flow(
            "to_approve",
            "work",
            "approve",
            FlowCondition::new("amount", Condition::greater_or_equal(100.0)),
        )
        .flow("approve", "end")
        .build()
        .unwrap()
}

fn thresholds_table() -> DecisionTable {
    DecisionTable::builder("thresholds")
        .hit_policy(HitPolicy::RuleOrder)
        .input("amount")
        .output("band", OutputType::String)
        .rule(vec![Condition::less_than(10.0)], vec![OutputExpression::literal("small")])
        .rule(vec![Condition::less_than(100.0)], vec![OutputExpression::literal("medium")])
        .build()
        .unwrap()
}

fn halving_table() -> DecisionTable {
    DecisionTable::builder("halving")
        .hit_policy(HitPolicy::First)
        .input("amount")
        .output("half", OutputType::Number)
        .rule(
            vec![Condition::Any],
            vec![OutputExpression::arithmetic(
                ArithmeticOp::Divide,
                OutputExpression::variable("amount"),
                OutputExpression::literal(2),
            )],
        )
        .build()
        .unwrap()
}

fn vars(value: Value) -> Variables {
    value.as_object().cloned().unwrap_or_default()
}

async fn only_token(engine: &ProcessEngine, process_instance_id: uuid::Uuid) -> (String, uuid::Uuid) {
    let executions = engine
        .runtime_service()
        .find_executions(process_instance_id)
        .await
        .unwrap();
    let tokens: Vec<_> = executions.iter().filter(|e| !e.is_process_instance()).collect();
    assert_eq!(tokens.len(), 1, "expected exactly one token, got {tokens:?}");
    (tokens[0].current_node_id.clone().unwrap_or_default(), tokens[0].id)
}

#[tokio::test]
async fn test_user_task_process_runs_to_completion() {
    let (engine, backend) = test_engine();
    engine
        .repository_service()
        .deploy(user_task_process("review"))
        .unwrap();
    let runtime = engine.runtime_service();

    let instance = runtime
        .create_process_instance_builder()
        .process_definition_key("review")
        .business_key("order-42")
        .start()
        .await
        .unwrap();
    assert_eq!(instance.process_definition_id, "review:1");
    assert_eq!(instance.business_key.as_deref(), Some("order-42"));

    let (node, token) = only_token(&engine, instance.id).await;
    assert_eq!(node, "review");

    runtime.trigger(token, None).await.unwrap();
    assert_eq!(backend.execution_count(), 0);

    let history = engine.history_service().find_history(instance.id).await.unwrap();
    let root = history.iter().find(|r| r.is_process_instance).unwrap();
    assert_eq!(root.delete_reason, delete_reason::PROCESS_INSTANCE_ENDED);
}

#[tokio::test]
async fn test_parallel_join_waits_for_every_branch() {
    let (engine, backend) = test_engine();
    engine.repository_service().deploy(parallel_process()).unwrap();
    let runtime = engine.runtime_service();

    let instance = runtime
        .start_process_instance_by_key("parallel", Variables::new())
        .await
        .unwrap();
    let waiting = runtime.find_executions(instance.id).await.unwrap();
    let left = at_node(&waiting, "left")[0].id;
    let right = at_node(&waiting, "right")[0].id;

    runtime.trigger(left, None).await.unwrap();
    let parked = runtime.find_executions(instance.id).await.unwrap();
    let at_join = at_node(&parked, "join");
    assert_eq!(at_join.len(), 1);
    assert!(!at_join[0].is_active);
    assert_eq!(at_node(&parked, "right").len(), 1);

    runtime.trigger(right, None).await.unwrap();
    assert_eq!(backend.execution_count(), 0);

    let history = engine.history_service().find_history(instance.id).await.unwrap();
    assert_eq!(
        history
            .iter()
            .filter(|r| r.delete_reason == delete_reason::PARALLEL_GATEWAY_JOIN)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_exclusive_gateway_routes_on_variables() {
    let (engine, _) = test_engine();
    engine.repository_service().deploy(routing_process()).unwrap();
    let runtime = engine.runtime_service();

    for (variables, expected) in [
        (json!({"amount": 50}), "small"),
        (json!({"amount": 500}), "large"),
        (json!({}), "fallback"),
    ] {
        let instance = runtime
            .start_process_instance_by_key("routing", vars(variables))
            .await
            .unwrap();
        let (node, _) = only_token(&engine, instance.id).await;
        assert_eq!(node, expected);
    }
}

#[tokio::test]
async fn test_unroutable_variables_fail_the_start() {
    let (engine, backend) = test_engine();
    engine.repository_service().deploy(routing_process()).unwrap();
    let mut events = engine.subscribe_events();

    let err = engine
        .runtime_service()
        .start_process_instance_by_key("routing", vars(json!({"amount": "lots"})))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Evaluation);
    assert_eq!(err.node_id(), Some("route"));
    assert_eq!(backend.execution_count(), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_business_rule_task_stores_result_rows() {
    let (engine, _) = test_engine();
    let repository = engine.repository_service();
    repository.deploy_decision(thresholds_table()).unwrap();
    repository
        .deploy(rule_task_process("rules", "thresholds", true))
        .unwrap();

    let instance = engine
        .runtime_service()
        .start_process_instance_by_key("rules", vars(json!({"amount": 5})))
        .await
        .unwrap();

    let (node, _) = only_token(&engine, instance.id).await;
    assert_eq!(node, "review");
    let variables = engine.runtime_service().get_variables(instance.id).await.unwrap();
    assert_eq!(
        variables["bands"],
        json!([{"band": "small"}, {"band": "medium"}])
    );
}

#[tokio::test]
async fn test_mandatory_rule_failure_rolls_back_the_instance() {
    let (engine, backend) = test_engine();
    let repository = engine.repository_service();
    repository.deploy_decision(halving_table()).unwrap();
    repository
        .deploy(rule_task_process("strict", "halving", true))
        .unwrap();

    let err = engine
        .runtime_service()
        .start_process_instance_by_key("strict", vars(json!({"amount": "abc"})))
        .await
        .unwrap_err();

    match &err {
        EngineError::Evaluation {
            decision_key,
            node_id,
            ..
        } => {
            assert_eq!(decision_key.as_deref(), Some("halving"));
            assert_eq!(node_id.as_deref(), Some("decide"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.execution_count(), 0);
}

#[tokio::test]
async fn test_optional_rule_failure_is_audited_and_continues() {
    let (engine, _) = test_engine();
    let repository = engine.repository_service();
    repository.deploy_decision(halving_table()).unwrap();
    repository
        .deploy(rule_task_process("lenient", "halving", false))
        .unwrap();

    let instance = engine
        .runtime_service()
        .start_process_instance_by_key("lenient", vars(json!({"amount": "abc"})))
        .await
        .unwrap();

    let (node, _) = only_token(&engine, instance.id).await;
    assert_eq!(node, "review");
    let variables = engine.runtime_service().get_variables(instance.id).await.unwrap();
    assert_eq!(variables["bands"], json!([]));

    let decisions = engine
        .history_service()
        .find_decision_history(instance.id)
        .await
        .unwrap();
    assert_eq!(decisions.len(), 1);
    let record = &decisions[0];
    assert_eq!(record.decision_key, "halving");
    assert_eq!(record.node_id, "decide");
    assert!(!record.fail_on_error);
    assert!(record.is_failed());
    assert!(record.audit.rule_executions[&0].is_failed());
    assert!(record.audit.failure_message().unwrap().starts_with("rule 0"));
}

#[tokio::test]
async fn test_successful_rule_task_records_its_audit() {
    let (engine, _) = test_engine();
    let repository = engine.repository_service();
    repository.deploy_decision(thresholds_table()).unwrap();
    repository
        .deploy(rule_task_process("rules", "thresholds", true))
        .unwrap();

    let instance = engine
        .runtime_service()
        .start_process_instance_by_key("rules", vars(json!({"amount": 50})))
        .await
        .unwrap();

    let decisions = engine
        .history_service()
        .find_decision_history(instance.id)
        .await
        .unwrap();
    assert_eq!(decisions.len(), 1);
    assert!(!decisions[0].is_failed());
    assert_eq!(decisions[0].audit.decision_results.len(), 1);
}

#[tokio::test]
async fn test_mandatory_rule_failure_keeps_its_audit_after_rollback() {
    let (engine, backend) = test_engine();
    let repository = engine.repository_service();
    repository.deploy_decision(halving_table()).unwrap();
    repository.deploy(gated_rule_process()).unwrap();
    let runtime = engine.runtime_service();

    let instance = runtime
        .start_process_instance_by_key("gated", Variables::new())
        .await
        .unwrap();
    let (_, token) = only_token(&engine, instance.id).await;

    let err = runtime
        .trigger(token, Some(json!({"amount": "abc"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Evaluation);

    // The trigger rolled back: token still waiting, payload not merged
    assert_eq!(only_token(&engine, instance.id).await, ("collect".to_string(), token));
    assert!(runtime.get_variables(instance.id).await.unwrap().get("amount").is_none());
    assert_eq!(backend.execution_count(), 2);

    let decisions = engine
        .history_service()
        .find_decision_history(instance.id)
        .await
        .unwrap();
    assert_eq!(decisions.len(), 1);
    assert!(decisions[0].fail_on_error);
    assert!(decisions[0].is_failed());
    assert_eq!(decisions[0].execution_id, token);
    assert!(decisions[0].audit.rule_executions[&0].is_failed());
}

#[tokio::test]
async fn test_decision_audit_is_not_recorded_without_history() {
    let mut config = EngineConfig::default();
    config.history.enabled = false;
    let (engine, _) = test_engine_with(config, None);
    let repository = engine.repository_service();
    repository.deploy_decision(halving_table()).unwrap();
    repository
        .deploy(rule_task_process("lenient", "halving", false))
        .unwrap();

    let instance = engine
        .runtime_service()
        .start_process_instance_by_key("lenient", vars(json!({"amount": "abc"})))
        .await
        .unwrap();

    assert!(engine
        .history_service()
        .find_decision_history(instance.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_node_without_holding_flow_fails_instead_of_ending() {
    let (engine, backend) = test_engine();
    engine.repository_service().deploy(guarded_process()).unwrap();
    let runtime = engine.runtime_service();

    let err = runtime
        .start_process_instance_by_key("guarded", vars(json!({"amount": 5})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Evaluation);
    assert_eq!(err.node_id(), Some("work"));
    assert_eq!(backend.execution_count(), 0);

    let instance = runtime
        .start_process_instance_by_key("guarded", vars(json!({"amount": 150})))
        .await
        .unwrap();
    assert_eq!(only_token(&engine, instance.id).await.0, "approve");
}

#[tokio::test]
async fn test_trigger_payload_merges_into_process_variables() {
    let (engine, _) = test_engine();
    engine.repository_service().deploy(two_step_process()).unwrap();
    let runtime = engine.runtime_service();

    let instance = runtime
        .create_process_instance_builder()
        .process_definition_key("two_step")
        .variable("customer", "acme")
        .start()
        .await
        .unwrap();
    let (_, token) = only_token(&engine, instance.id).await;

    runtime
        .trigger(token, Some(json!({"approved": true, "customer": "globex"})))
        .await
        .unwrap();

    let variables = runtime.get_variables(instance.id).await.unwrap();
    assert_eq!(variables["approved"], json!(true));
    assert_eq!(variables["customer"], json!("globex"));
    let (node, _) = only_token(&engine, instance.id).await;
    assert_eq!(node, "second");
}

#[tokio::test]
async fn test_non_object_payload_is_rejected() {
    let (engine, _) = test_engine();
    engine.repository_service().deploy(two_step_process()).unwrap();
    let runtime = engine.runtime_service();
    let instance = runtime
        .start_process_instance_by_key("two_step", Variables::new())
        .await
        .unwrap();
    let (_, token) = only_token(&engine, instance.id).await;

    let err = runtime.trigger(token, Some(json!([1, 2]))).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument { .. }));
    let (node, _) = only_token(&engine, instance.id).await;
    assert_eq!(node, "first");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: every key of an object payload is visible on the process
    /// instance after the trigger
    #[test]
    fn trigger_payload_is_fully_merged(payload in payload_strategy()) {
        let (engine, _) = test_engine();
        engine.repository_service().deploy(two_step_process()).unwrap();

        let variables = tokio_test::block_on(async {
            let runtime = engine.runtime_service();
            let instance = runtime
                .start_process_instance_by_key("two_step", Variables::new())
                .await
                .unwrap();
            let (_, token) = only_token(&engine, instance.id).await;
            runtime.trigger(token, Some(payload.clone())).await.unwrap();
            runtime.get_variables(instance.id).await.unwrap()
        });

        for (key, value) in payload.as_object().unwrap() {
            prop_assert_eq!(variables.get(key), Some(value));
        }
    }
}

#[tokio::test]
async fn test_message_correlates_to_the_addressed_instance() {
    let (engine, _) = test_engine();
    engine.repository_service().deploy(payment_process()).unwrap();
    let runtime = engine.runtime_service();

    let first = runtime
        .start_process_instance_by_key("payment", Variables::new())
        .await
        .unwrap();
    let second = runtime
        .start_process_instance_by_key("payment", Variables::new())
        .await
        .unwrap();
    let (_, second_token) = only_token(&engine, second.id).await;

    let delivered = runtime
        .message_event_received("paid", Some(second_token), Some(json!({"amount": 10})))
        .await
        .unwrap();
    assert_eq!(delivered, second_token);

    assert_eq!(only_token(&engine, first.id).await.0, "wait_payment");
    assert_eq!(only_token(&engine, second.id).await.0, "ship");
    assert_eq!(runtime.get_variables(second.id).await.unwrap()["amount"], json!(10));

    let err = runtime
        .message_event_received("refunded", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: "message subscription", .. }));
}

#[tokio::test]
async fn test_delete_process_instance_removes_the_tree() {
    let (engine, backend) = test_engine();
    engine.repository_service().deploy(parallel_process()).unwrap();
    let runtime = engine.runtime_service();

    let instance = runtime
        .start_process_instance_by_key("parallel", Variables::new())
        .await
        .unwrap();
    let waiting = runtime.find_executions(instance.id).await.unwrap();
    let token = at_node(&waiting, "left")[0].id;

    // Only roots can be deleted this way
    let err = runtime.delete_process_instance(token, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);

    assert!(runtime
        .delete_process_instance(instance.id, Some("cancelled by operator"))
        .await
        .unwrap());
    assert_eq!(backend.execution_count(), 0);

    let history = engine.history_service().find_history(instance.id).await.unwrap();
    assert_eq!(history.len(), 3);
    let root = history.iter().find(|r| r.is_process_instance).unwrap();
    assert_eq!(root.delete_reason, "cancelled by operator");

    let err = runtime
        .delete_process_instance(instance.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataIntegrity);
}

#[tokio::test]
async fn test_events_are_published_after_commit() {
    let (engine, _) = test_engine();
    engine
        .repository_service()
        .deploy(user_task_process("review"))
        .unwrap();
    let mut receiver = engine.subscribe_events();
    let runtime = engine.runtime_service();

    let instance = runtime
        .start_process_instance_by_key("review", Variables::new())
        .await
        .unwrap();
    let started = receiver.try_recv().unwrap();
    assert_eq!(started.name, events::PROCESS_STARTED);
    assert_eq!(started.process_instance_id, Some(instance.id));

    let (_, token) = only_token(&engine, instance.id).await;
    runtime.trigger(token, None).await.unwrap();

    let mut names = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        names.push(event.name);
    }
    assert!(names.iter().any(|n| n == events::EXECUTION_DELETED));
    assert_eq!(names.last().map(String::as_str), Some(events::PROCESS_COMPLETED));
}

#[tokio::test]
async fn test_start_by_definition_id_pins_the_version() {
    let (engine, _) = test_engine();
    let repository = engine.repository_service();
    repository.deploy(user_task_process("review")).unwrap();
    let latest = repository.deploy(user_task_process("review")).unwrap();
    assert_eq!(latest.id, "review:2");

    let runtime = engine.runtime_service();
    let pinned = runtime
        .create_process_instance_builder()
        .process_definition_key("review")
        .process_definition_id("review:1")
        .start()
        .await
        .unwrap();
    assert_eq!(pinned.process_definition_id, "review:1");

    let by_key = runtime
        .start_process_instance_by_key("review", Variables::new())
        .await
        .unwrap();
    assert_eq!(by_key.process_definition_id, "review:2");
}

#[tokio::test]
async fn test_start_argument_errors() {
    let (engine, backend) = test_engine();
    let runtime = engine.runtime_service();

    let err = runtime
        .create_process_instance_builder()
        .start()
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument { .. }));
    assert!(err.to_string().contains("process definition key"));

    let err = runtime
        .start_process_instance_by_key("missing", Variables::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
    assert_eq!(backend.applied_change_sets(), 0);
}

#[tokio::test]
async fn test_history_can_be_switched_off() {
    let mut config = EngineConfig::default();
    config.history.enabled = false;
    let (engine, _) = test_engine_with(config, None);
    engine
        .repository_service()
        .deploy(user_task_process("review"))
        .unwrap();
    let runtime = engine.runtime_service();

    let instance = runtime
        .start_process_instance_by_key("review", Variables::new())
        .await
        .unwrap();
    let (_, token) = only_token(&engine, instance.id).await;
    runtime.trigger(token, None).await.unwrap();

    assert!(engine
        .history_service()
        .find_history(instance.id)
        .await
        .unwrap()
        .is_empty());
}
