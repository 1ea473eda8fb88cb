use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Executions allowed to run at once; further submissions wait
    pub max_concurrent_executions: usize,
    /// Per-attempt timeout for steps and workflows that set none
    pub default_step_timeout_ms: u64,
    /// Wait between re-polls while a step waits on an in-flight dependency
    pub deadlock_poll_interval_ms: u64,
    pub event_buffer_size: usize,
}

impl RuntimeConfig {
    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_millis(self.default_step_timeout_ms)
    }

    pub fn deadlock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.deadlock_poll_interval_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 10,
            default_step_timeout_ms: 30_000,
            deadlock_poll_interval_ms: 1_000,
            event_buffer_size: 1000,
        }
    }
}
