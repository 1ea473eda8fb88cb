use crate::{ExecutionContext, ExecutionId, StepId, Value, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Terminal outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: StepId,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Attempts actually used
    pub attempt: u32,
    /// Set when the step's retry policy asks to stop the workflow
    pub should_stop: bool,
    pub used_fallback: bool,
}

impl StepResult {
    pub fn success(step_id: impl Into<StepId>, result: Value, attempt: u32, elapsed: Duration) -> Self {
        Self {
            step_id: step_id.into(),
            success: true,
            result: Some(result),
            error: None,
            duration_ms: elapsed.as_millis() as u64,
            attempt,
            should_stop: false,
            used_fallback: false,
        }
    }

    pub fn failure(
        step_id: impl Into<StepId>,
        error: impl Into<String>,
        attempt: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
            duration_ms: elapsed.as_millis() as u64,
            attempt,
            should_stop: false,
            used_fallback: false,
        }
    }

    pub fn with_fallback(mut self) -> Self {
        self.used_fallback = true;
        self
    }

    pub fn with_stop(mut self, should_stop: bool) -> Self {
        self.should_stop = should_stop;
        self
    }
}

/// Final report for one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    /// No failed steps and not cancelled
    pub success: bool,
    pub cancelled: bool,
    pub duration_ms: u64,
    pub steps_completed: usize,
    pub steps_failed: usize,
    pub steps_total: usize,
    pub results: HashMap<StepId, StepResult>,
    pub context: ExecutionContext,
    pub completed_at: DateTime<Utc>,
    /// Why the run did not succeed. `None` on success and on cancellation;
    /// aborted runs return `Err` instead.
    pub error: Option<String>,
}
