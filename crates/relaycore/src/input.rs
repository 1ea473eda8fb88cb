use crate::{ComponentError, StepType, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Typed view over a step's parameter map, one shape per [`StepType`].
///
/// Built once before the first attempt so that ill-formed parameters are
/// reported as a configuration error instead of being retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepInput {
    Llm {
        prompt: String,
        model: Option<String>,
    },
    Mcp {
        tool: String,
        arguments: HashMap<String, Value>,
    },
    Web {
        url: String,
    },
    Mobile {
        command: String,
        device: Option<String>,
    },
    Database {
        query: String,
    },
    Api {
        endpoint: String,
        method: Option<String>,
    },
}

impl StepInput {
    pub fn from_params(
        step_type: StepType,
        params: &HashMap<String, Value>,
    ) -> Result<Self, ComponentError> {
        let input = match step_type {
            StepType::Llm => StepInput::Llm {
                prompt: require_str(params, "prompt")?,
                model: optional_str(params, "model")?,
            },
            StepType::Mcp => StepInput::Mcp {
                tool: require_str(params, "tool")?,
                arguments: match params.get("arguments") {
                    None | Some(Value::Null) => HashMap::new(),
                    Some(Value::Object(map)) => map.clone(),
                    Some(other) => return Err(mismatch("arguments", "object", other)),
                },
            },
            StepType::Web => StepInput::Web {
                url: require_str(params, "url")?,
            },
            StepType::Mobile => StepInput::Mobile {
                command: require_str(params, "command")?,
                device: optional_str(params, "device")?,
            },
            StepType::Database => StepInput::Database {
                query: require_str(params, "query")?,
            },
            StepType::Api => StepInput::Api {
                endpoint: require_str(params, "endpoint")?,
                method: optional_str(params, "method")?,
            },
        };
        Ok(input)
    }

    pub fn step_type(&self) -> StepType {
        match self {
            StepInput::Llm { .. } => StepType::Llm,
            StepInput::Mcp { .. } => StepType::Mcp,
            StepInput::Web { .. } => StepType::Web,
            StepInput::Mobile { .. } => StepType::Mobile,
            StepInput::Database { .. } => StepType::Database,
            StepInput::Api { .. } => StepType::Api,
        }
    }
}

fn require_str(params: &HashMap<String, Value>, key: &str) -> Result<String, ComponentError> {
    match params.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(mismatch(key, "string", other)),
        None => Err(ComponentError::MissingInput(key.to_string())),
    }
}

fn optional_str(params: &HashMap<String, Value>, key: &str) -> Result<Option<String>, ComponentError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(mismatch(key, "string", other)),
    }
}

fn mismatch(field: &str, expected: &str, actual: &Value) -> ComponentError {
    ComponentError::InvalidInputType {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_llm_input() {
        let input = StepInput::from_params(
            StepType::Llm,
            &params(&[("prompt", Value::from("summarize")), ("model", Value::from("small"))]),
        )
        .unwrap();
        assert_eq!(
            input,
            StepInput::Llm { prompt: "summarize".into(), model: Some("small".into()) }
        );
        assert_eq!(input.step_type(), StepType::Llm);
    }

    #[test]
    fn test_missing_required_key() {
        let err = StepInput::from_params(StepType::Database, &HashMap::new()).unwrap_err();
        assert_eq!(err, ComponentError::MissingInput("query".into()));
    }

    #[test]
    fn test_wrong_type() {
        let err = StepInput::from_params(StepType::Web, &params(&[("url", Value::from(3.0))])).unwrap_err();
        assert!(matches!(
            err,
            ComponentError::InvalidInputType { ref field, ref actual, .. } if field == "url" && actual == "number"
        ));
    }

    #[test]
    fn test_mcp_arguments_default_to_empty() {
        let input = StepInput::from_params(StepType::Mcp, &params(&[("tool", Value::from("search"))])).unwrap();
        assert_eq!(input, StepInput::Mcp { tool: "search".into(), arguments: HashMap::new() });
    }
}
