// Shared test components for the runtime integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use relaycore::{
    Component, ComponentError, ComponentRequest, FailureRecovery, FailureReport, RecoveryOutcome, Value,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Fails the first `failures` calls, then returns `value`
pub struct FlakyComponent {
    name: String,
    failures: u32,
    value: Value,
    calls: AtomicU32,
}

impl FlakyComponent {
    pub fn new(name: &str, failures: u32, value: impl Into<Value>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failures,
            value: value.into(),
            calls: AtomicU32::new(0),
        })
    }

    /// Never succeeds
    pub fn broken(name: &str) -> Arc<Self> {
        Self::new(name, u32::MAX, Value::Null)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Component for FlakyComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _request: ComponentRequest) -> Result<Value, ComponentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(ComponentError::ExecutionFailed(format!("{} failure #{}", self.name, call)))
        } else {
            Ok(self.value.clone())
        }
    }
}

/// Records the step ids it runs, optionally sleeping first. Ignores
/// cancellation on purpose.
pub struct RecordingComponent {
    name: String,
    delay: Duration,
    log: Mutex<Vec<String>>,
}

impl RecordingComponent {
    pub fn new(name: &str) -> Arc<Self> {
        Self::slow(name, Duration::ZERO)
    }

    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay,
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn steps(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Component for RecordingComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, request: ComponentRequest) -> Result<Value, ComponentError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.log.lock().unwrap().push(request.step_id.clone());
        Ok(Value::from(request.step_id))
    }
}

/// Returns its rendered parameters
pub struct EchoComponent;

#[async_trait]
impl Component for EchoComponent {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(&self, request: ComponentRequest) -> Result<Value, ComponentError> {
        Ok(Value::Object(request.params))
    }
}

/// Succeeds only when `mode` is "safe"; supports a single action
pub struct ModeComponent {
    pub calls: AtomicU32,
}

impl ModeComponent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0) })
    }
}

#[async_trait]
impl Component for ModeComponent {
    fn name(&self) -> &str {
        "mode"
    }

    fn supports(&self, action: &str) -> bool {
        action == "run"
    }

    async fn execute(&self, request: ComponentRequest) -> Result<Value, ComponentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match request.params.get("mode").and_then(|v| v.as_str()) {
            Some("safe") => Ok(Value::from("safe result")),
            other => Err(ComponentError::ExecutionFailed(format!("unsafe mode {:?}", other))),
        }
    }
}

/// Keeps every failure report it receives
#[derive(Default)]
pub struct RecordingRecovery {
    reports: Mutex<Vec<FailureReport>>,
}

impl RecordingRecovery {
    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl FailureRecovery for RecordingRecovery {
    async fn handle_failure(&self, report: &FailureReport) -> RecoveryOutcome {
        self.reports.lock().unwrap().push(report.clone());
        RecoveryOutcome {
            recovered: true,
            message: "noted".to_string(),
        }
    }
}

/// Requires a `json` parameter the way the transform component does
pub struct StrictComponent {
    pub calls: AtomicU32,
}

impl StrictComponent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0) })
    }
}

#[async_trait]
impl Component for StrictComponent {
    fn name(&self) -> &str {
        "strict"
    }

    async fn execute(&self, request: ComponentRequest) -> Result<Value, ComponentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let json = request.require_param("json")?;
        Ok(json.clone())
    }
}
