use crate::{Value, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Per-run identity, variables and permissions, threaded through every
/// step invocation of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub workflow_id: WorkflowId,
    pub user_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub orchestrator_id: String,
    pub trace_id: Uuid,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub permissions: HashSet<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new(workflow_id: WorkflowId, orchestrator_id: impl Into<String>) -> Self {
        Self {
            workflow_id,
            user_id: None,
            started_at: Utc::now(),
            orchestrator_id: orchestrator_id.into(),
            trace_id: Uuid::new_v4(),
            variables: HashMap::new(),
            permissions: HashSet::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Substitute `{{name}}` placeholders in string parameters with context
    /// variables. Unknown names are left as written.
    pub fn render_params(&self, params: &HashMap<String, Value>) -> HashMap<String, Value> {
        params
            .iter()
            .map(|(k, v)| (k.clone(), self.render_value(v)))
            .collect()
    }

    fn render_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => self.render_str(s),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render_value(v)).collect()),
            Value::Object(map) => Value::Object(self.render_params(map)),
            other => other.clone(),
        }
    }

    fn render_str(&self, template: &str) -> Value {
        // A lone placeholder keeps the variable's own type
        if let Some(name) = whole_placeholder(template) {
            if let Some(value) = self.variables.get(name) {
                return value.clone();
            }
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let name = rest[start + 2..start + 2 + len].trim();
            out.push_str(&rest[..start]);
            match self.variables.get(name) {
                Some(Value::String(s)) => out.push_str(s),
                Some(Value::Number(n)) => out.push_str(&n.to_string()),
                Some(Value::Bool(b)) => out.push_str(&b.to_string()),
                Some(other) => out.push_str(&other.to_json().to_string()),
                None => out.push_str(&rest[start..start + 4 + len]),
            }
            rest = &rest[start + 4 + len..];
        }
        out.push_str(rest);
        Value::String(out)
    }
}

fn whole_placeholder(template: &str) -> Option<&str> {
    let inner = template.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}
