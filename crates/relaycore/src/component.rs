use crate::{ComponentError, EventEmitter, ExecutionContext, StepId, StepInput, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Core trait that every executable component implements
#[async_trait]
pub trait Component: Send + Sync {
    /// Registry name (e.g., "http.request", "time.delay")
    fn name(&self) -> &str;

    /// Whether `action` is something this component can perform. Checked
    /// once before the first attempt.
    fn supports(&self, _action: &str) -> bool {
        true
    }

    /// Perform one action
    async fn execute(&self, request: ComponentRequest) -> Result<Value, ComponentError>;
}

/// Everything a component gets for one invocation
#[derive(Clone)]
pub struct ComponentRequest {
    pub step_id: StepId,
    pub action: String,

    /// Typed view of `params` for the step's type
    pub input: StepInput,

    /// Parameters after templating and any fallback adjustment
    pub params: HashMap<String, Value>,

    pub context: Arc<ExecutionContext>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Fires when the execution is cancelled. Components may observe it;
    /// the engine never aborts an invocation that ignores it.
    pub cancellation: CancellationToken,
}

impl ComponentRequest {
    /// Get required parameter or return error
    pub fn require_param(&self, name: &str) -> Result<&Value, ComponentError> {
        self.params
            .get(name)
            .ok_or_else(|| ComponentError::MissingInput(name.to_string()))
    }

    /// Get parameter with default
    pub fn param_or(&self, name: &str, default: Value) -> Value {
        self.params.get(name).cloned().unwrap_or(default)
    }

    pub fn info(&self, message: impl Into<String>) {
        self.events.info(&self.step_id, message);
    }
}
