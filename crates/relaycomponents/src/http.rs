use async_trait::async_trait;
use relaycore::{Component, ComponentError, ComponentRequest, StepInput, Value};
use std::collections::HashMap;

/// HTTP requests for `web` and `api` steps. The action is the method.
pub struct HttpComponent {
    client: reqwest::Client,
}

impl HttpComponent {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpComponent {
    fn default() -> Self {
        Self::new()
    }
}

const METHODS: &[&str] = &["get", "post", "put", "delete"];

/// Target URL from the typed input, or a `url` parameter for other step types
fn target_url(request: &ComponentRequest) -> Result<String, ComponentError> {
    match &request.input {
        StepInput::Web { url } => Ok(url.clone()),
        StepInput::Api { endpoint, .. } => Ok(endpoint.clone()),
        _ => {
            let value = request.require_param("url")?;
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ComponentError::InvalidInputType {
                    field: "url".to_string(),
                    expected: "string".to_string(),
                    actual: value.kind().to_string(),
                })
        }
    }
}

#[async_trait]
impl Component for HttpComponent {
    fn name(&self) -> &str {
        "http.request"
    }

    fn supports(&self, action: &str) -> bool {
        METHODS.contains(&action.to_lowercase().as_str())
    }

    async fn execute(&self, request: ComponentRequest) -> Result<Value, ComponentError> {
        let url = target_url(&request)?;
        let method = request.action.to_lowercase();

        tracing::debug!("HTTP {} {}", method.to_uppercase(), url);
        request.info(format!("{} {}", method.to_uppercase(), url));

        let mut builder = match method.as_str() {
            "get" => self.client.get(&url),
            "post" => self.client.post(&url),
            "put" => self.client.put(&url),
            "delete" => self.client.delete(&url),
            other => return Err(ComponentError::UnsupportedAction(other.to_string())),
        };

        if let Some(body) = request.params.get("body") {
            builder = match body {
                Value::String(text) => builder.body(text.clone()),
                other => builder.json(&other.to_json()),
            };
        }

        if let Some(Value::Object(headers)) = request.params.get("headers") {
            for (key, value) in headers {
                if let Some(val_str) = value.as_str() {
                    builder = builder.header(key, val_str);
                }
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ComponentError::ExecutionFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let headers_map: HashMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
            .collect();

        let body_text = response
            .text()
            .await
            .map_err(|e| ComponentError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

        request.info(format!("Response status: {}", status.as_u16()));

        // Server errors are worth retrying; client errors are returned as data
        if status.is_server_error() {
            return Err(ComponentError::ExecutionFailed(format!(
                "{} {} returned {}",
                method.to_uppercase(),
                url,
                status.as_u16()
            )));
        }

        let mut result = HashMap::new();
        result.insert("status".to_string(), Value::Number(f64::from(status.as_u16())));
        result.insert("body".to_string(), Value::String(body_text));
        result.insert("headers".to_string(), Value::Object(headers_map));
        Ok(Value::Object(result))
    }
}
