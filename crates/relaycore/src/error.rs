use thiserror::Error;

/// Errors raised by a component invocation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Cancelled")]
    Cancelled,
}

impl ComponentError {
    /// Only execution failures are worth another attempt. Bad inputs and
    /// unknown actions fail the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, ComponentError::ExecutionFailed(_))
    }
}

/// Why a single step did not succeed. Captured into `StepResult::error`,
/// never thrown past the step executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("Step rejected by guardrails: {reason}")]
    GuardrailRejected { reason: String },

    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("Component '{component}' does not support action '{action}'")]
    UnsupportedAction { component: String, action: String },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Step timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Component invocation failed: {0}")]
    Invocation(#[from] ComponentError),

    #[error("Result validation failed: {0}")]
    ResultValidation(String),

    #[error("Cancelled")]
    Cancelled,
}

impl StepError {
    /// Transient failures go through retry and fallback; configuration and
    /// validation failures end the step at once.
    pub fn is_retryable(&self) -> bool {
        match self {
            StepError::Timeout { .. } | StepError::ResultValidation(_) => true,
            StepError::Invocation(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow rejected by guardrails: {reason}")]
    GuardrailRejected { reason: String },

    #[error("Circular dependency detected at step '{step_id}'")]
    CircularDependency { step_id: String },

    #[error("Invalid workflow: {0}")]
    InvalidDefinition(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),
}
