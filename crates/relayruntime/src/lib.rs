//! Workflow execution runtime
//!
//! This crate provides the engine that runs workflows: the component
//! registry, the per-run step queue and result collector, the step
//! executor with its retry and fallback handling, and the engine that
//! supervises concurrent executions.

mod collector;
mod config;
mod engine;
mod error;
mod execution;
mod executor;
pub mod loader;
mod queue;
mod registry;

pub use collector::ResultCollector;
pub use config::RuntimeConfig;
pub use engine::{ExecutionHandle, WorkflowEngine};
pub use error::{ErrorPhase, RuntimeError};
pub use execution::{ExecutionProgress, ExecutionState, ExecutionStatus, WorkflowExecution};
pub use executor::{ExecutionScope, StepExecutor};
pub use queue::StepQueue;
pub use registry::ComponentRegistry;
