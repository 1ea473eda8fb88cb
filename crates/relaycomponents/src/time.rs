use async_trait::async_trait;
use relaycore::{Component, ComponentError, ComponentRequest, Value};
use tokio::time::{sleep, Duration};

/// Waits `delay_ms` (default 1000) then passes its parameters through.
/// Stops early when the execution is cancelled.
pub struct DelayComponent;

#[async_trait]
impl Component for DelayComponent {
    fn name(&self) -> &str {
        "time.delay"
    }

    async fn execute(&self, request: ComponentRequest) -> Result<Value, ComponentError> {
        let delay_ms = request
            .params
            .get("delay_ms")
            .and_then(|v| v.as_f64())
            .unwrap_or(1000.0) as u64;

        request.info(format!("Delaying for {}ms", delay_ms));

        tokio::select! {
            _ = sleep(Duration::from_millis(delay_ms)) => {}
            _ = request.cancellation.cancelled() => {
                tracing::debug!("Delay for step {} interrupted", request.step_id);
                return Err(ComponentError::Cancelled);
            }
        }

        Ok(Value::Object(request.params))
    }
}
