//! Core abstractions for the relay workflow engine
//!
//! This crate provides the workflow data model and the narrow interfaces
//! to the engine's collaborators (components, guardrails, failure
//! recovery). It has no runtime of its own.

mod component;
mod context;
mod error;
pub mod events;
mod guardrail;
mod input;
mod recovery;
mod result;
mod value;
mod workflow;

pub use component::{Component, ComponentRequest};
pub use context::ExecutionContext;
pub use error::{ComponentError, StepError, WorkflowError};
pub use events::{EventBus, EventEmitter, ExecutionEvent, ExecutionId, StepEvent};
pub use guardrail::{AllowAll, GuardrailValidator, GuardrailVerdict, PermissionGuardrails};
pub use input::StepInput;
pub use recovery::{FailureRecovery, FailureReport, LoggingRecovery, RecoveryOutcome};
pub use result::{StepResult, WorkflowResult};
pub use value::Value;
pub use workflow::{
    BackoffKind, FallbackStrategy, ResultShape, RetryPolicy, Step, StepId, StepType, Workflow,
    WorkflowId,
};
