use async_trait::async_trait;
use relaycore::{Component, ComponentError, ComponentRequest, Value};

/// JSON helpers: `parse` a string, `stringify` a value, `merge` two objects
pub struct JsonTransformComponent;

const ACTIONS: &[&str] = &["parse", "stringify", "merge"];

#[async_trait]
impl Component for JsonTransformComponent {
    fn name(&self) -> &str {
        "transform.json"
    }

    fn supports(&self, action: &str) -> bool {
        ACTIONS.contains(&action)
    }

    async fn execute(&self, request: ComponentRequest) -> Result<Value, ComponentError> {
        match request.action.as_str() {
            "parse" => {
                let input = request.require_param("json")?;
                let text = input.as_str().ok_or_else(|| type_error("json", "string", input))?;
                let parsed: serde_json::Value = serde_json::from_str(text)
                    .map_err(|e| ComponentError::ExecutionFailed(format!("JSON parse error: {}", e)))?;
                Ok(Value::from(parsed))
            }
            "stringify" => {
                let value = request.require_param("value")?;
                let json = serde_json::to_string_pretty(&value.to_json())
                    .map_err(|e| ComponentError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;
                Ok(Value::String(json))
            }
            "merge" => {
                let base = object_param(&request, "base")?;
                let patch = object_param(&request, "patch")?;
                let mut merged = base.clone();
                merged.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(Value::Object(merged))
            }
            other => Err(ComponentError::UnsupportedAction(other.to_string())),
        }
    }
}

fn object_param<'a>(
    request: &'a ComponentRequest,
    name: &str,
) -> Result<&'a std::collections::HashMap<String, Value>, ComponentError> {
    let value = request.require_param(name)?;
    value.as_object().ok_or_else(|| type_error(name, "object", value))
}

fn type_error(field: &str, expected: &str, actual: &Value) -> ComponentError {
    ComponentError::InvalidInputType {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.kind().to_string(),
    }
}
