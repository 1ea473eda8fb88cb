use async_trait::async_trait;
use relaycore::{Component, ComponentError, ComponentRequest, Value};

/// Returns its parameters unchanged and logs them
pub struct EchoComponent;

#[async_trait]
impl Component for EchoComponent {
    fn name(&self) -> &str {
        "debug.echo"
    }

    async fn execute(&self, request: ComponentRequest) -> Result<Value, ComponentError> {
        request.info(format!("DEBUG: {} {:?}", request.action, request.input));

        for (key, value) in &request.params {
            request.info(format!("  {}: {:?}", key, value));
        }

        Ok(Value::Object(request.params))
    }
}
