use crate::{Value, WorkflowError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

pub type WorkflowId = Uuid;
pub type StepId = String;

/// Complete workflow definition. Read-only once execution starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub guardrails: Vec<String>,
    /// Applied to steps that do not set their own timeout
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
            guardrails: Vec::new(),
            default_timeout_ms: None,
            metadata: HashMap::new(),
        }
    }

    pub fn add_step(&mut self, step: Step) -> StepId {
        let id = step.id.clone();
        self.steps.push(step);
        id
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_guardrail(mut self, name: impl Into<String>) -> Self {
        self.guardrails.push(name.into());
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn find_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Structural checks that do not need an execution: unique step ids,
    /// dependencies that name existing steps, at least one attempt per step.
    /// Cycles are left to the execution's deadlock check.
    pub fn validate_definition(&self) -> Result<(), WorkflowError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        for step in &self.steps {
            if let Some(missing) = step.depends_on.iter().find(|dep| !seen.contains(dep.as_str())) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, missing
                )));
            }
            if step.retry_policy.max_attempts == 0 {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "step '{}' must allow at least one attempt",
                    step.id
                )));
            }
        }

        Ok(())
    }
}

/// Kind of work a step performs. Each kind has its own typed input, see
/// [`crate::StepInput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Llm,
    Mcp,
    Web,
    Mobile,
    Database,
    Api,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Llm => "llm",
            StepType::Mcp => "mcp",
            StepType::Web => "web",
            StepType::Mobile => "mobile",
            StepType::Database => "database",
            StepType::Api => "api",
        }
    }
}

/// One unit of work bound to a component and action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub component: String,
    pub action: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub fallbacks: Vec<FallbackStrategy>,
    #[serde(default)]
    pub guardrails: Vec<String>,
    #[serde(default)]
    pub expected_result: Option<ResultShape>,
}

impl Step {
    pub fn new(
        id: impl Into<StepId>,
        step_type: StepType,
        component: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            step_type,
            component: component.into(),
            action: action.into(),
            params: HashMap::new(),
            depends_on: Vec::new(),
            retry_policy: RetryPolicy::default(),
            timeout_ms: None,
            fallbacks: Vec::new(),
            guardrails: Vec::new(),
            expected_result: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(mut self, id: impl Into<StepId>) -> Self {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    pub fn with_guardrail(mut self, name: impl Into<String>) -> Self {
        self.guardrails.push(name.into());
        self
    }

    pub fn expecting(mut self, shape: ResultShape) -> Self {
        self.expected_result = Some(shape);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Exponential,
    Linear,
    Fixed,
}

/// Retry policy for step execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: BackoffKind,
    /// Exhausting this step's attempts ends the whole workflow
    pub stop_on_failure: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff: BackoffKind) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            ..Self::default()
        }
        .with_backoff(backoff)
    }

    /// A single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            backoff: BackoffKind::Fixed,
            stop_on_failure: false,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffKind) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = max_delay.as_millis() as u64;
        self
    }

    pub fn stop_on_failure(mut self) -> Self {
        self.stop_on_failure = true;
        self
    }

    /// Delay to wait after the given (1-based) failed attempt, before the
    /// next one.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.base_delay_ms;
        let raw = match self.backoff {
            BackoffKind::Exponential => {
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                base.saturating_mul(factor)
            }
            BackoffKind::Linear => base.saturating_mul(u64::from(attempt)),
            BackoffKind::Fixed => base,
        };
        Duration::from_millis(raw.min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff: BackoffKind::Exponential,
            stop_on_failure: false,
        }
    }
}

/// Alternate ways to satisfy a failing step, tried in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Run the same action on another component
    ComponentReplacement { component: String },
    /// Re-run the original component with patched parameters
    ParameterAdjustment { params: HashMap<String, Value> },
    /// Reports success with the descriptor as payload. The running workflow
    /// is not changed.
    WorkflowModification {
        description: String,
        #[serde(default)]
        changes: HashMap<String, Value>,
    },
}

impl FallbackStrategy {
    pub fn kind(&self) -> &'static str {
        match self {
            FallbackStrategy::ComponentReplacement { .. } => "component_replacement",
            FallbackStrategy::ParameterAdjustment { .. } => "parameter_adjustment",
            FallbackStrategy::WorkflowModification { .. } => "workflow_modification",
        }
    }
}

/// Expected shape of a successful step's result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultShape {
    Any,
    Null,
    Bool,
    Number,
    String,
    Array,
    Object {
        #[serde(default)]
        required_keys: Vec<String>,
    },
}

impl ResultShape {
    pub fn check(&self, value: &Value) -> Result<(), String> {
        let matches = match (self, value) {
            (ResultShape::Any, _) => true,
            (ResultShape::Null, Value::Null) => true,
            (ResultShape::Bool, Value::Bool(_)) => true,
            (ResultShape::Number, Value::Number(_)) => true,
            (ResultShape::String, Value::String(_)) => true,
            (ResultShape::Array, Value::Array(_)) => true,
            (ResultShape::Object { required_keys }, Value::Object(map)) => {
                if let Some(missing) = required_keys.iter().find(|k| !map.contains_key(k.as_str())) {
                    return Err(format!("result is missing key '{}'", missing));
                }
                true
            }
            _ => false,
        };

        if matches {
            Ok(())
        } else {
            Err(format!("expected {}, got {}", self.name(), value.kind()))
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ResultShape::Any => "any",
            ResultShape::Null => "null",
            ResultShape::Bool => "bool",
            ResultShape::Number => "number",
            ResultShape::String => "string",
            ResultShape::Array => "array",
            ResultShape::Object { .. } => "object",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(kind: BackoffKind) -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(1000), kind).with_max_delay(Duration::from_millis(5000))
    }

    #[test]
    fn test_exponential_backoff_is_clamped() {
        let p = policy(BackoffKind::Exponential);
        let delays: Vec<u64> = (1..=5).map(|a| p.delay_for(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 5000, 5000]);
    }

    #[test]
    fn test_linear_backoff() {
        let p = policy(BackoffKind::Linear);
        let delays: Vec<u64> = (1..=3).map(|a| p.delay_for(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_fixed_backoff() {
        let p = policy(BackoffKind::Fixed);
        assert!((1..=4).all(|a| p.delay_for(a) == Duration::from_millis(1000)));
    }

    #[test]
    fn test_exponential_backoff_does_not_overflow() {
        let p = policy(BackoffKind::Exponential);
        assert_eq!(p.delay_for(200), Duration::from_millis(5000));
    }

    #[test]
    fn test_validate_definition_rejects_unknown_dependency() {
        let workflow = Workflow::new("broken")
            .with_step(Step::new("a", StepType::Api, "http", "get").depends_on("ghost"));
        let err = workflow.validate_definition().unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidDefinition(msg) if msg.contains("ghost")));
    }

    #[test]
    fn test_validate_definition_rejects_duplicates() {
        let workflow = Workflow::new("dup")
            .with_step(Step::new("a", StepType::Api, "http", "get"))
            .with_step(Step::new("a", StepType::Api, "http", "get"));
        assert!(workflow.validate_definition().is_err());
    }

    #[test]
    fn test_validate_definition_allows_cycles() {
        let workflow = Workflow::new("cycle")
            .with_step(Step::new("a", StepType::Api, "http", "get").depends_on("b"))
            .with_step(Step::new("b", StepType::Api, "http", "get").depends_on("a"));
        assert!(workflow.validate_definition().is_ok());
    }

    #[test]
    fn test_result_shape_object_keys() {
        let shape = ResultShape::Object { required_keys: vec!["summary".into()] };
        let mut map = HashMap::new();
        assert!(shape.check(&Value::Object(map.clone())).is_err());
        map.insert("summary".to_string(), Value::from("ok"));
        assert!(shape.check(&Value::Object(map)).is_ok());
        assert_eq!(
            ResultShape::String.check(&Value::from(1.0)),
            Err("expected string, got number".to_string())
        );
    }

    #[test]
    fn test_step_deserializes_with_defaults() {
        let json = r#"{
            "id": "fetch",
            "name": "Fetch page",
            "type": "web",
            "component": "http.request",
            "action": "get",
            "fallbacks": [{"strategy": "component_replacement", "component": "mirror"}]
        }"#;
        let step: Step = serde_json::from_str(json).unwrap();
        assert_eq!(step.step_type, StepType::Web);
        assert_eq!(step.retry_policy.max_attempts, 3);
        assert_eq!(
            step.fallbacks,
            vec![FallbackStrategy::ComponentReplacement { component: "mirror".into() }]
        );
    }

    #[test]
    fn test_partial_retry_policy_takes_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 2}"#).unwrap();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.max_delay_ms, 30_000);
        assert_eq!(policy.backoff, BackoffKind::Exponential);
        assert!(!policy.stop_on_failure);
    }
}
