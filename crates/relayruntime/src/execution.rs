use crate::collector::ResultCollector;
use crate::executor::{ExecutionScope, StepExecutor};
use crate::queue::StepQueue;
use crate::RuntimeError;
use chrono::Utc;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use relaycore::{
    EventEmitter, ExecutionContext, ExecutionEvent, ExecutionId, Step, StepId, WorkflowError,
    WorkflowId, WorkflowResult, Workflow,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

/// Lifecycle of one execution. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub remaining: usize,
    pub percentage: f64,
}

/// Point-in-time view of an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionState,
    pub progress: ExecutionProgress,
    pub current_step: Option<StepId>,
    pub elapsed_ms: u64,
}

struct RunState {
    queue: StepQueue,
    collector: ResultCollector,
    status: ExecutionState,
    current_step: Option<StepId>,
    last_step: Option<StepId>,
    stopped_by: Option<StepId>,
    started: Option<Instant>,
    deadlock_polls: u32,
}

/// Drives one workflow instance through its steps, one step at a time.
///
/// The queue, collector and cancellation token belong to this execution
/// alone; status queries read them under a short lock while the run
/// continues.
pub struct WorkflowExecution {
    id: ExecutionId,
    workflow: Arc<Workflow>,
    context: Arc<ExecutionContext>,
    executor: Arc<StepExecutor>,
    events: EventEmitter,
    cancellation: CancellationToken,
    poll_interval: Duration,
    state: RwLock<RunState>,
}

impl WorkflowExecution {
    pub fn new(
        id: ExecutionId,
        workflow: Arc<Workflow>,
        context: ExecutionContext,
        executor: Arc<StepExecutor>,
    ) -> Self {
        let queue = StepQueue::new(workflow.steps.clone());
        Self {
            id,
            workflow,
            context: Arc::new(context),
            executor,
            events: EventEmitter::detached(id),
            cancellation: CancellationToken::new(),
            poll_interval: Duration::from_secs(1),
            state: RwLock::new(RunState {
                queue,
                collector: ResultCollector::new(),
                status: ExecutionState::Created,
                current_step: None,
                last_step: None,
                stopped_by: None,
                started: None,
                deadlock_polls: 0,
            }),
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Step running now, or the last one that ran
    pub async fn failing_step(&self) -> Option<StepId> {
        let state = self.state.read().await;
        state.current_step.clone().or_else(|| state.last_step.clone())
    }

    /// Times the run waited on an in-flight dependency
    pub async fn deadlock_polls(&self) -> u32 {
        self.state.read().await.deadlock_polls
    }

    /// Request cancellation. The step in progress finishes; no further step
    /// starts. Returns false if the execution already ended.
    pub async fn cancel(&self) -> bool {
        let mut state = self.state.write().await;
        if state.status.is_terminal() {
            return false;
        }
        state.status = ExecutionState::Cancelled;
        self.cancellation.cancel();
        drop(state);

        tracing::info!("Execution {} cancelled", self.id);
        self.events.emit(ExecutionEvent::WorkflowCancelled {
            execution_id: self.id,
            timestamp: Utc::now(),
        });
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub async fn status(&self) -> ExecutionStatus {
        let state = self.state.read().await;
        let total = state.queue.len();
        let completed = state.collector.completed_steps().len();
        let failed = state.collector.failed_steps().len();
        let percentage = if total == 0 {
            100.0
        } else {
            (completed + failed) as f64 / total as f64 * 100.0
        };

        ExecutionStatus {
            execution_id: self.id,
            workflow_id: self.workflow.id,
            status: state.status,
            progress: ExecutionProgress {
                total,
                completed,
                failed,
                remaining: state.queue.remaining_steps().len(),
                percentage,
            },
            current_step: state.current_step.clone(),
            elapsed_ms: state
                .started
                .map(|s| s.elapsed().as_millis() as u64)
                .unwrap_or(0),
        }
    }

    /// Run the workflow to a terminal state.
    ///
    /// Step failures end up in the result; only validation and structural
    /// problems are returned as errors.
    pub async fn run(&self) -> Result<WorkflowResult, RuntimeError> {
        {
            let mut state = self.state.write().await;
            let status = state.status;
            match status {
                ExecutionState::Created => {}
                ExecutionState::Cancelled => {
                    drop(state);
                    return Ok(self.finish().await);
                }
                other => {
                    return Err(RuntimeError::Execution(format!(
                        "Execution {} cannot start from state {:?}",
                        self.id, other
                    )))
                }
            }
            state.status = ExecutionState::Running;
            state.started = Some(Instant::now());
        }

        tracing::info!("Starting workflow execution: {} ({})", self.workflow.name, self.id);
        self.events.emit(ExecutionEvent::WorkflowStarted {
            execution_id: self.id,
            workflow_id: self.workflow.id,
            timestamp: Utc::now(),
        });

        match self.drive().await {
            Ok(()) => Ok(self.finish().await),
            Err(e) => {
                let duration_ms = {
                    let mut state = self.state.write().await;
                    if !state.status.is_terminal() {
                        state.status = ExecutionState::Failed;
                    }
                    state.current_step = None;
                    state.started.map(|s| s.elapsed().as_millis() as u64).unwrap_or(0)
                };
                tracing::error!("Workflow execution {} aborted: {}", self.id, e);
                self.events.emit(ExecutionEvent::WorkflowCompleted {
                    execution_id: self.id,
                    success: false,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn drive(&self) -> Result<(), RuntimeError> {
        self.workflow.validate_definition()?;

        let verdict = self
            .executor
            .guardrails()
            .validate_workflow(&self.workflow, &self.context)
            .await;
        if !verdict.compliant {
            return Err(WorkflowError::GuardrailRejected {
                reason: verdict.reason_or_default(),
            }
            .into());
        }

        let scope = ExecutionScope {
            context: self.context.clone(),
            events: self.events.clone(),
            cancellation: self.cancellation.clone(),
            default_timeout: self
                .workflow
                .default_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| self.executor.default_timeout()),
        };

        while !self.cancellation.is_cancelled() {
            let next = {
                let mut state = self.state.write().await;
                let next = state.queue.next_ready_step().cloned();
                state.current_step = next.as_ref().map(|s| s.id.clone());
                next
            };

            if let Some(step) = next {
                let result = self.executor.execute(&step, &scope).await;
                let stop = !result.success && result.should_stop;

                let mut state = self.state.write().await;
                if result.success {
                    state.queue.mark_completed(&step.id);
                } else {
                    state.queue.mark_failed(&step.id);
                }
                state.collector.add_result(step.id.clone(), result);
                state.current_step = None;
                state.last_step = Some(step.id.clone());

                if stop {
                    tracing::warn!("Step {} requested a workflow stop", step.id);
                    state.stopped_by = Some(step.id.clone());
                    break;
                }
                continue;
            }

            let (remaining, waiting_on_in_flight) = {
                let state = self.state.read().await;
                let remaining: Vec<Step> = state.queue.remaining_steps().into_iter().cloned().collect();
                let in_flight = state.current_step.as_deref();
                let waiting = remaining
                    .iter()
                    .any(|s| s.depends_on.iter().any(|d| Some(d.as_str()) == in_flight));
                (remaining, waiting)
            };

            if remaining.is_empty() {
                break;
            }

            if let Some(step_id) = find_cycle(&remaining) {
                return Err(WorkflowError::CircularDependency { step_id }.into());
            }

            if !waiting_on_in_flight {
                tracing::info!(
                    "{} step(s) blocked by failed dependencies will not run",
                    remaining.len()
                );
                break;
            }

            self.state.write().await.deadlock_polls += 1;
            tracing::debug!("Waiting {:?} for in-flight dependencies", self.poll_interval);
            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                _ = self.cancellation.cancelled() => {}
            }
        }

        Ok(())
    }

    async fn finish(&self) -> WorkflowResult {
        let mut state = self.state.write().await;
        let cancelled = state.status == ExecutionState::Cancelled || self.cancellation.is_cancelled();
        let steps_completed = state.collector.completed_steps().len();
        let steps_failed = state.collector.failed_steps().len();
        let success = steps_failed == 0 && !cancelled;
        let error = if success || cancelled {
            None
        } else {
            Some(failure_summary(&state))
        };

        state.status = if cancelled {
            ExecutionState::Cancelled
        } else if success {
            ExecutionState::Completed
        } else {
            ExecutionState::Failed
        };
        state.current_step = None;
        let duration_ms = state.started.map(|s| s.elapsed().as_millis() as u64).unwrap_or(0);

        tracing::info!(
            "Workflow execution {} finished: {}/{} steps completed, {} failed{}",
            self.id,
            steps_completed,
            state.queue.len(),
            steps_failed,
            if cancelled { " (cancelled)" } else { "" }
        );
        self.events.emit(ExecutionEvent::WorkflowCompleted {
            execution_id: self.id,
            success,
            duration_ms,
            timestamp: Utc::now(),
        });

        WorkflowResult {
            workflow_id: self.workflow.id,
            execution_id: self.id,
            success,
            cancelled,
            duration_ms,
            steps_completed,
            steps_failed,
            steps_total: state.queue.len(),
            results: state.collector.all_results(),
            context: (*self.context).clone(),
            completed_at: Utc::now(),
            error,
        }
    }
}

/// One-line account of why a finished run did not succeed
fn failure_summary(state: &RunState) -> String {
    let failed = state.collector.failed_steps();
    let not_run = state.queue.remaining_steps().len();

    let mut summary = match &state.stopped_by {
        Some(step_id) => format!("Step '{}' failed and stopped the workflow", step_id),
        None => format!("{} step(s) failed: {}", failed.len(), failed.join(", ")),
    };
    if not_run > 0 {
        let reason = if state.stopped_by.is_some() {
            "not run"
        } else {
            "blocked by failed dependencies"
        };
        summary.push_str(&format!("; {} step(s) {}", not_run, reason));
    }
    summary
}

/// First step, in declaration order, that can reach itself through the
/// dependencies of the remaining steps
fn find_cycle(remaining: &[Step]) -> Option<StepId> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let index: HashMap<&str, NodeIndex> = remaining
        .iter()
        .map(|s| (s.id.as_str(), graph.add_node(s.id.as_str())))
        .collect();

    // Edges point from a step to what it waits on
    for step in remaining {
        let from = index[step.id.as_str()];
        for dep in &step.depends_on {
            if let Some(&to) = index.get(dep.as_str()) {
                graph.add_edge(from, to, ());
            }
        }
    }

    remaining
        .iter()
        .find(|step| {
            let this = index[step.id.as_str()];
            step.depends_on
                .iter()
                .filter_map(|dep| index.get(dep.as_str()))
                .any(|&dep| dep == this || has_path_connecting(&graph, dep, this, None))
        })
        .map(|s| s.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycore::StepType;

    fn step(id: &str, deps: &[&str]) -> Step {
        deps.iter().fold(Step::new(id, StepType::Api, "api", "call"), |s, d| s.depends_on(*d))
    }

    #[test]
    fn test_find_cycle_mutual() {
        let steps = vec![step("a", &["b"]), step("b", &["a"])];
        assert_eq!(find_cycle(&steps), Some("a".to_string()));
    }

    #[test]
    fn test_find_cycle_self_dependency() {
        let steps = vec![step("solo", &["solo"])];
        assert_eq!(find_cycle(&steps), Some("solo".to_string()));
    }

    #[test]
    fn test_find_cycle_names_member_not_dependent() {
        // "report" waits on the cycle but is not part of it
        let steps = vec![step("report", &["x"]), step("x", &["y"]), step("y", &["z"]), step("z", &["x"])];
        assert_eq!(find_cycle(&steps), Some("x".to_string()));
    }

    #[test]
    fn test_find_cycle_blocked_chain_is_not_a_cycle() {
        // "analyze" waits on a failed step that is no longer remaining
        let steps = vec![step("analyze", &["fetch"]), step("notify", &["analyze"])];
        assert_eq!(find_cycle(&steps), None);
    }
}
