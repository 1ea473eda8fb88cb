use crate::registry::ComponentRegistry;
use chrono::Utc;
use relaycore::{
    Component, ComponentRequest, EventEmitter, ExecutionContext, ExecutionEvent,
    FallbackStrategy, GuardrailValidator, Step, StepError, StepInput, StepResult, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

/// What a step needs from the execution running it
#[derive(Clone)]
pub struct ExecutionScope {
    pub context: Arc<ExecutionContext>,
    pub events: EventEmitter,
    pub cancellation: CancellationToken,
    /// Per-attempt timeout for steps that set none
    pub default_timeout: Duration,
}

/// Runs a single step to a terminal result: guardrail check, component
/// lookup, timed attempts with backoff, then fallbacks.
pub struct StepExecutor {
    registry: Arc<ComponentRegistry>,
    guardrails: Arc<dyn GuardrailValidator>,
    default_timeout: Duration,
}

/// A resolved step ready for its attempt loop
struct Prepared<'a> {
    step: &'a Step,
    component: Arc<dyn Component>,
    input: StepInput,
    params: HashMap<String, Value>,
    timeout: Duration,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        guardrails: Arc<dyn GuardrailValidator>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            guardrails,
            default_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn guardrails(&self) -> &Arc<dyn GuardrailValidator> {
        &self.guardrails
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Execute one step. Failures are reported in the returned result,
    /// never as an error.
    pub async fn execute(&self, step: &Step, scope: &ExecutionScope) -> StepResult {
        let start = Instant::now();
        let execution_id = scope.events.execution_id();

        scope.events.emit(ExecutionEvent::StepStarted {
            execution_id,
            step_id: step.id.clone(),
            component: step.component.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!("Starting step {} ({} via {})", step.id, step.action, step.component);

        let result = match self.prepare(step, scope).await {
            Ok(prepared) => self.run_attempts(&prepared, scope, start).await,
            Err(e) => {
                tracing::error!("Step {} rejected before execution: {}", step.id, e);
                StepResult::failure(&step.id, e.to_string(), 0, start.elapsed())
            }
        };

        if result.success {
            tracing::info!(
                "Step {} completed in {}ms after {} attempt(s)",
                step.id, result.duration_ms, result.attempt
            );
            scope.events.emit(ExecutionEvent::StepCompleted {
                execution_id,
                step_id: step.id.clone(),
                attempt: result.attempt,
                used_fallback: result.used_fallback,
                duration_ms: result.duration_ms,
                timestamp: Utc::now(),
            });
        } else {
            scope.events.emit(ExecutionEvent::StepFailed {
                execution_id,
                step_id: step.id.clone(),
                error: result.error.clone().unwrap_or_default(),
                attempt: result.attempt,
                timestamp: Utc::now(),
            });
        }

        result
    }

    /// Checks that fail the step without any attempt
    async fn prepare<'a>(&self, step: &'a Step, scope: &ExecutionScope) -> Result<Prepared<'a>, StepError> {
        let verdict = self.guardrails.validate_step(step, &scope.context).await;
        if !verdict.compliant {
            return Err(StepError::GuardrailRejected {
                reason: verdict.reason_or_default(),
            });
        }

        let component = self.registry.resolve(&step.component)?;
        if !component.supports(&step.action) {
            return Err(StepError::UnsupportedAction {
                component: step.component.clone(),
                action: step.action.clone(),
            });
        }

        let params = scope.context.render_params(&step.params);
        let input = StepInput::from_params(step.step_type, &params)
            .map_err(|e| StepError::InvalidParameters(e.to_string()))?;

        Ok(Prepared {
            step,
            component,
            input,
            params,
            timeout: step.timeout().unwrap_or(scope.default_timeout),
        })
    }

    async fn run_attempts(&self, prepared: &Prepared<'_>, scope: &ExecutionScope, start: Instant) -> StepResult {
        let step = prepared.step;
        let policy = &step.retry_policy;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempts_used = 0;
        let mut last_error = StepError::Cancelled;
        let mut cancelled = false;
        let mut fatal = false;

        for attempt in 1..=max_attempts {
            attempts_used = attempt;
            match self
                .invoke(&prepared.component, prepared, &prepared.input, &prepared.params, scope)
                .await
            {
                Ok(value) => return StepResult::success(&step.id, value, attempt, start.elapsed()),
                Err(e) => {
                    tracing::warn!("Step {} attempt {}/{} failed: {}", step.id, attempt, max_attempts, e);
                    last_error = e;
                }
            }

            if !last_error.is_retryable() {
                fatal = true;
                break;
            }

            if attempt == max_attempts {
                break;
            }
            if scope.cancellation.is_cancelled() {
                cancelled = true;
                break;
            }

            let delay = policy.delay_for(attempt);
            scope.events.emit(ExecutionEvent::StepRetrying {
                execution_id: scope.events.execution_id(),
                step_id: step.id.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                error: last_error.to_string(),
                timestamp: Utc::now(),
            });

            tokio::select! {
                _ = sleep(delay) => {}
                _ = scope.cancellation.cancelled() => {
                    tracing::info!("Step {} retry wait interrupted by cancellation", step.id);
                    cancelled = true;
                    break;
                }
            }

            if let Some(result) = self.try_fallbacks(prepared, scope, attempt, start).await {
                return result;
            }
        }

        // Last chance once the primary attempts are used up
        if !fatal && !cancelled && !scope.cancellation.is_cancelled() {
            if let Some(result) = self.try_fallbacks(prepared, scope, attempts_used, start).await {
                return result;
            }
        }

        tracing::error!(
            "Step {} failed after {} attempt(s): {}",
            step.id, attempts_used, last_error
        );
        StepResult::failure(&step.id, last_error.to_string(), attempts_used, start.elapsed())
            .with_stop(policy.stop_on_failure)
    }

    /// One timed invocation followed by result-shape validation
    async fn invoke(
        &self,
        component: &Arc<dyn Component>,
        prepared: &Prepared<'_>,
        input: &StepInput,
        params: &HashMap<String, Value>,
        scope: &ExecutionScope,
    ) -> Result<Value, StepError> {
        let step = prepared.step;
        let request = ComponentRequest {
            step_id: step.id.clone(),
            action: step.action.clone(),
            input: input.clone(),
            params: params.clone(),
            context: scope.context.clone(),
            events: scope.events.clone(),
            cancellation: scope.cancellation.clone(),
        };

        // On timeout the invocation future is dropped, not joined
        let value = match timeout(prepared.timeout, component.execute(request)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return Err(StepError::Invocation(e)),
            Err(_) => {
                return Err(StepError::Timeout {
                    ms: prepared.timeout.as_millis() as u64,
                })
            }
        };

        if let Some(shape) = &step.expected_result {
            shape.check(&value).map_err(StepError::ResultValidation)?;
        }
        Ok(value)
    }

    /// Try each fallback in order; the first success ends the step
    async fn try_fallbacks(
        &self,
        prepared: &Prepared<'_>,
        scope: &ExecutionScope,
        attempt: u32,
        start: Instant,
    ) -> Option<StepResult> {
        let step = prepared.step;

        for fallback in &step.fallbacks {
            if scope.cancellation.is_cancelled() {
                return None;
            }

            let outcome = match fallback {
                FallbackStrategy::ComponentReplacement { component } => {
                    match self.registry.resolve(component) {
                        Ok(substitute) if substitute.supports(&step.action) => {
                            self.invoke(&substitute, prepared, &prepared.input, &prepared.params, scope)
                                .await
                        }
                        Ok(_) => Err(StepError::UnsupportedAction {
                            component: component.clone(),
                            action: step.action.clone(),
                        }),
                        Err(e) => Err(e),
                    }
                }
                FallbackStrategy::ParameterAdjustment { params: patch } => {
                    let mut params = prepared.params.clone();
                    params.extend(scope.context.render_params(patch));
                    match StepInput::from_params(step.step_type, &params) {
                        Ok(input) => {
                            self.invoke(&prepared.component, prepared, &input, &params, scope)
                                .await
                        }
                        Err(e) => Err(StepError::InvalidParameters(e.to_string())),
                    }
                }
                FallbackStrategy::WorkflowModification { description, changes } => {
                    // Marker only: the remaining steps of this run are untouched
                    let mut marker = HashMap::new();
                    marker.insert("strategy".to_string(), Value::from(fallback.kind()));
                    marker.insert("description".to_string(), Value::from(description.clone()));
                    marker.insert("changes".to_string(), Value::Object(changes.clone()));
                    Ok(Value::Object(marker))
                }
            };

            scope.events.emit(ExecutionEvent::FallbackUsed {
                execution_id: scope.events.execution_id(),
                step_id: step.id.clone(),
                strategy: fallback.kind().to_string(),
                success: outcome.is_ok(),
                timestamp: Utc::now(),
            });

            match outcome {
                Ok(value) => {
                    tracing::info!("Step {} recovered through {} fallback", step.id, fallback.kind());
                    return Some(
                        StepResult::success(&step.id, value, attempt, start.elapsed()).with_fallback(),
                    );
                }
                Err(e) => {
                    tracing::warn!("Step {} {} fallback failed: {}", step.id, fallback.kind(), e);
                }
            }
        }

        None
    }
}
