use crate::{ExecutionContext, ExecutionId, StepId, WorkflowId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Describes an execution that ended with an error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    /// Step that was running (or last ran) when the failure surfaced
    pub step_id: Option<StepId>,
    pub error: String,
    pub context: ExecutionContext,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub recovered: bool,
    pub message: String,
}

/// Side channel notified when an execution fails.
///
/// The outcome is only logged and emitted; it never changes the error
/// already returned to the caller and it is not a retry mechanism.
#[async_trait]
pub trait FailureRecovery: Send + Sync {
    async fn handle_failure(&self, report: &FailureReport) -> RecoveryOutcome;
}

/// Records the failure and recovers nothing
pub struct LoggingRecovery;

#[async_trait]
impl FailureRecovery for LoggingRecovery {
    async fn handle_failure(&self, report: &FailureReport) -> RecoveryOutcome {
        tracing::warn!(
            workflow_id = %report.workflow_id,
            execution_id = %report.execution_id,
            step_id = report.step_id.as_deref().unwrap_or("-"),
            "Execution failed: {}",
            report.error
        );
        RecoveryOutcome {
            recovered: false,
            message: "failure recorded".to_string(),
        }
    }
}
