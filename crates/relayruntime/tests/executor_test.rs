// crates/relayruntime/tests/executor_test.rs

mod common;

use common::{
    init_tracing, EchoComponent, FlakyComponent, ModeComponent, RecordingComponent, StrictComponent,
};
use relaycore::{
    AllowAll, BackoffKind, EventEmitter, ExecutionContext, FallbackStrategy, GuardrailValidator,
    PermissionGuardrails, ResultShape, RetryPolicy, Step, StepType, Value,
};
use relayruntime::{ComponentRegistry, ExecutionScope, StepExecutor};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn executor_with(registry: ComponentRegistry, guardrails: Arc<dyn GuardrailValidator>) -> StepExecutor {
    StepExecutor::new(Arc::new(registry), guardrails, Duration::from_secs(5))
}

fn scope_with(context: ExecutionContext) -> ExecutionScope {
    ExecutionScope {
        context: Arc::new(context),
        events: EventEmitter::detached(Uuid::new_v4()),
        cancellation: CancellationToken::new(),
        default_timeout: Duration::from_secs(5),
    }
}

fn scope() -> ExecutionScope {
    scope_with(ExecutionContext::new(Uuid::new_v4(), "test"))
}

fn fixed(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(5), BackoffKind::Fixed)
}

fn llm_step(id: &str, component: &str) -> Step {
    Step::new(id, StepType::Llm, component, "complete").with_param("prompt", "hello")
}

#[tokio::test]
async fn test_attempts_bounded_by_policy() {
    init_tracing();
    let broken = FlakyComponent::broken("llm");
    let mut registry = ComponentRegistry::new();
    registry.register(broken.clone());
    let executor = executor_with(registry, Arc::new(AllowAll));

    let step = llm_step("summarize", "llm").with_retry(fixed(3));
    let result = executor.execute(&step, &scope()).await;

    assert!(!result.success);
    assert_eq!(result.attempt, 3);
    assert_eq!(broken.calls(), 3);
    assert!(!result.should_stop);
    assert!(result.error.unwrap().contains("llm failure #3"));
}

#[tokio::test]
async fn test_succeeds_on_later_attempt() {
    let flaky = FlakyComponent::new("llm", 2, "done");
    let mut registry = ComponentRegistry::new();
    registry.register(flaky.clone());
    let executor = executor_with(registry, Arc::new(AllowAll));

    let result = executor.execute(&llm_step("s", "llm").with_retry(fixed(3)), &scope()).await;

    assert!(result.success);
    assert_eq!(result.attempt, 3);
    assert_eq!(result.result, Some(Value::from("done")));
    assert!(!result.used_fallback);
}

#[tokio::test]
async fn test_component_replacement_fallback() {
    let primary = FlakyComponent::broken("llm.primary");
    let backup = FlakyComponent::new("llm.backup", 0, "from backup");
    let mut registry = ComponentRegistry::new();
    registry.register(primary.clone());
    registry.register(backup.clone());
    let executor = executor_with(registry, Arc::new(AllowAll));

    let step = llm_step("s", "llm.primary")
        .with_retry(fixed(2))
        .with_fallback(FallbackStrategy::ComponentReplacement { component: "llm.missing".into() })
        .with_fallback(FallbackStrategy::ComponentReplacement { component: "llm.backup".into() });
    let result = executor.execute(&step, &scope()).await;

    assert!(result.success);
    assert!(result.used_fallback);
    assert_eq!(result.result, Some(Value::from("from backup")));
    assert_eq!(result.attempt, 1);
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn test_fallbacks_run_once_attempts_are_exhausted() {
    let primary = FlakyComponent::broken("llm.primary");
    let backup = FlakyComponent::new("llm.backup", 0, "late backup");
    let mut registry = ComponentRegistry::new();
    registry.register(primary.clone());
    registry.register(backup);
    let executor = executor_with(registry, Arc::new(AllowAll));

    let step = llm_step("s", "llm.primary")
        .with_retry(RetryPolicy::none())
        .with_fallback(FallbackStrategy::ComponentReplacement { component: "llm.backup".into() });
    let result = executor.execute(&step, &scope()).await;

    assert!(result.success);
    assert!(result.used_fallback);
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn test_parameter_adjustment_fallback() {
    let component = ModeComponent::new();
    let mut registry = ComponentRegistry::new();
    registry.register(component.clone());
    let executor = executor_with(registry, Arc::new(AllowAll));

    let mut patch = HashMap::new();
    patch.insert("mode".to_string(), Value::from("safe"));
    let step = Step::new("s", StepType::Mobile, "mode", "run")
        .with_param("command", "swipe")
        .with_param("mode", "fast")
        .with_retry(fixed(2))
        .with_fallback(FallbackStrategy::ParameterAdjustment { params: patch });
    let result = executor.execute(&step, &scope()).await;

    assert!(result.success);
    assert!(result.used_fallback);
    assert_eq!(result.result, Some(Value::from("safe result")));
    assert_eq!(component.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_workflow_modification_is_a_marker() {
    let mut registry = ComponentRegistry::new();
    registry.register(FlakyComponent::broken("llm"));
    let executor = executor_with(registry, Arc::new(AllowAll));

    let step = llm_step("s", "llm").with_retry(fixed(2)).with_fallback(
        FallbackStrategy::WorkflowModification {
            description: "skip enrichment".into(),
            changes: HashMap::new(),
        },
    );
    let result = executor.execute(&step, &scope()).await;

    assert!(result.success);
    assert!(result.used_fallback);
    let marker = result.result.unwrap();
    let map = marker.as_object().unwrap();
    assert_eq!(map.get("description"), Some(&Value::from("skip enrichment")));
    assert_eq!(map.get("strategy"), Some(&Value::from("workflow_modification")));
}

#[tokio::test]
async fn test_attempt_times_out() {
    let mut registry = ComponentRegistry::new();
    registry.register(RecordingComponent::slow("slow", Duration::from_millis(500)));
    let executor = executor_with(registry, Arc::new(AllowAll));

    let step = llm_step("s", "slow")
        .with_retry(RetryPolicy::none())
        .with_timeout(Duration::from_millis(20));
    let start = Instant::now();
    let result = executor.execute(&step, &scope()).await;

    assert!(!result.success);
    assert!(start.elapsed() < Duration::from_millis(400));
    assert_eq!(result.error.as_deref(), Some("Step timed out after 20ms"));
}

#[tokio::test]
async fn test_missing_component_is_not_retried() {
    let executor = executor_with(ComponentRegistry::new(), Arc::new(AllowAll));

    let step = llm_step("s", "llm.ghost").with_retry(fixed(5));
    let result = executor.execute(&step, &scope()).await;

    assert!(!result.success);
    assert_eq!(result.attempt, 0);
    assert_eq!(result.error.as_deref(), Some("Component not found: llm.ghost"));
}

#[tokio::test]
async fn test_unsupported_action_and_bad_params_fail_fast() {
    let component = ModeComponent::new();
    let mut registry = ComponentRegistry::new();
    registry.register(component.clone());
    let executor = executor_with(registry, Arc::new(AllowAll));

    let wrong_action = Step::new("a", StepType::Mobile, "mode", "fly").with_param("command", "x");
    let result = executor.execute(&wrong_action, &scope()).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("does not support action 'fly'"));

    // Mobile steps need a `command`
    let missing_param = Step::new("b", StepType::Mobile, "mode", "run");
    let result = executor.execute(&missing_param, &scope()).await;
    assert!(!result.success);
    assert_eq!(
        result.error.as_deref(),
        Some("Invalid parameters: Missing required input: command")
    );

    assert_eq!(component.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_component_input_errors_are_not_retried() {
    let strict = StrictComponent::new();
    let backup = FlakyComponent::new("llm.backup", 0, "from backup");
    let mut registry = ComponentRegistry::new();
    registry.register(strict.clone());
    registry.register(backup.clone());
    let executor = executor_with(registry, Arc::new(AllowAll));

    let step = llm_step("parse", "strict")
        .with_retry(RetryPolicy::new(4, Duration::from_millis(100), BackoffKind::Fixed))
        .with_fallback(FallbackStrategy::ComponentReplacement { component: "llm.backup".into() });

    let start = Instant::now();
    let result = executor.execute(&step, &scope()).await;

    assert!(!result.success);
    assert_eq!(result.attempt, 1);
    assert_eq!(strict.calls.load(Ordering::SeqCst), 1);
    assert_eq!(backup.calls(), 0);
    assert!(!result.used_fallback);
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(
        result.error.as_deref(),
        Some("Component invocation failed: Missing required input: json")
    );
}

#[tokio::test]
async fn test_step_guardrail_blocks_invocation() {
    let recorder = RecordingComponent::new("db");
    let mut registry = ComponentRegistry::new();
    registry.register(recorder.clone());
    let executor = executor_with(registry, Arc::new(PermissionGuardrails));

    let step = Step::new("q", StepType::Database, "db", "select")
        .with_param("query", "select 1")
        .with_guardrail("db.read");
    let result = executor.execute(&step, &scope()).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("requires permission 'db.read'"));
    assert!(recorder.steps().is_empty());

    let permitted = scope_with(ExecutionContext::new(Uuid::new_v4(), "test").with_permission("db.read"));
    assert!(executor.execute(&step, &permitted).await.success);
}

#[tokio::test]
async fn test_result_shape_mismatch_is_retried() {
    let numbers = FlakyComponent::new("calc", 0, 42.0);
    let mut registry = ComponentRegistry::new();
    registry.register(numbers.clone());
    let executor = executor_with(registry, Arc::new(AllowAll));

    let step = llm_step("s", "calc").with_retry(fixed(2)).expecting(ResultShape::String);
    let result = executor.execute(&step, &scope()).await;

    assert!(!result.success);
    assert_eq!(numbers.calls(), 2);
    assert_eq!(
        result.error.as_deref(),
        Some("Result validation failed: expected string, got number")
    );
}

#[tokio::test]
async fn test_stop_on_failure_sets_should_stop() {
    let mut registry = ComponentRegistry::new();
    registry.register(FlakyComponent::broken("llm"));
    let executor = executor_with(registry, Arc::new(AllowAll));

    let step = llm_step("s", "llm").with_retry(fixed(2).stop_on_failure());
    let result = executor.execute(&step, &scope()).await;

    assert!(!result.success);
    assert!(result.should_stop);
}

#[tokio::test]
async fn test_cancellation_skips_retry_wait() {
    let broken = FlakyComponent::broken("llm");
    let mut registry = ComponentRegistry::new();
    registry.register(broken.clone());
    let executor = Arc::new(executor_with(registry, Arc::new(AllowAll)));

    let step = llm_step("s", "llm").with_retry(RetryPolicy::new(
        5,
        Duration::from_secs(10),
        BackoffKind::Fixed,
    ));
    let scope = scope();
    let token = scope.cancellation.clone();

    let task = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute(&step, &scope).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("retry wait should end on cancellation")
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.attempt, 1);
    assert_eq!(broken.calls(), 1);
}

#[tokio::test]
async fn test_parameters_are_templated() {
    let mut registry = ComponentRegistry::new();
    registry.register(Arc::new(EchoComponent));
    let executor = executor_with(registry, Arc::new(AllowAll));

    let step = Step::new("s", StepType::Web, "echo", "get").with_param("url", "https://{{host}}/status");
    let context = ExecutionContext::new(Uuid::new_v4(), "test").with_variable("host", "example.org");
    let result = executor.execute(&step, &scope_with(context)).await;

    assert!(result.success);
    let echoed = result.result.unwrap();
    assert_eq!(
        echoed.as_object().and_then(|m| m.get("url")),
        Some(&Value::from("https://example.org/status"))
    );
}
