use relaycore::{ExecutionId, WorkflowError};
use std::fmt;
use thiserror::Error;

/// Top-level errors surfaced to the engine's caller
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("{} error: {0}", phase_label(.0))]
    Workflow(#[from] WorkflowError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Engine is shutting down")]
    ShuttingDown,

    #[error("Execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which phase of a run an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    Validation,
    Execution,
    Structural,
}

impl fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPhase::Validation => write!(f, "validation"),
            ErrorPhase::Execution => write!(f, "execution"),
            ErrorPhase::Structural => write!(f, "structural"),
        }
    }
}

impl RuntimeError {
    pub fn phase(&self) -> ErrorPhase {
        match self {
            RuntimeError::Workflow(e) => workflow_phase(e),
            RuntimeError::Serialization(_) => ErrorPhase::Validation,
            _ => ErrorPhase::Execution,
        }
    }
}

fn workflow_phase(err: &WorkflowError) -> ErrorPhase {
    match err {
        WorkflowError::CircularDependency { .. } => ErrorPhase::Structural,
        WorkflowError::GuardrailRejected { .. }
        | WorkflowError::InvalidDefinition(_)
        | WorkflowError::StepNotFound(_) => ErrorPhase::Validation,
    }
}

fn phase_label(err: &WorkflowError) -> &'static str {
    match workflow_phase(err) {
        ErrorPhase::Validation => "Validation",
        ErrorPhase::Execution => "Execution",
        ErrorPhase::Structural => "Structural",
    }
}
