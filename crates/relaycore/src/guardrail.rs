use crate::{ExecutionContext, Step, Workflow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of a compliance check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    pub compliant: bool,
    pub reason: Option<String>,
}

impl GuardrailVerdict {
    pub fn allow() -> Self {
        Self {
            compliant: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            compliant: false,
            reason: Some(reason.into()),
        }
    }

    pub fn reason_or_default(&self) -> String {
        self.reason.clone().unwrap_or_else(|| "non-compliant".to_string())
    }
}

/// External policy check gating a workflow before it runs and each step
/// before its first attempt
#[async_trait]
pub trait GuardrailValidator: Send + Sync {
    async fn validate_workflow(&self, workflow: &Workflow, context: &ExecutionContext) -> GuardrailVerdict;

    async fn validate_step(&self, step: &Step, context: &ExecutionContext) -> GuardrailVerdict;
}

/// Accepts everything
pub struct AllowAll;

#[async_trait]
impl GuardrailValidator for AllowAll {
    async fn validate_workflow(&self, _workflow: &Workflow, _context: &ExecutionContext) -> GuardrailVerdict {
        GuardrailVerdict::allow()
    }

    async fn validate_step(&self, _step: &Step, _context: &ExecutionContext) -> GuardrailVerdict {
        GuardrailVerdict::allow()
    }
}

/// Treats every guardrail name as a permission the context must hold
pub struct PermissionGuardrails;

impl PermissionGuardrails {
    fn check(names: &[String], context: &ExecutionContext, subject: &str) -> GuardrailVerdict {
        match names.iter().find(|name| !context.has_permission(name)) {
            Some(missing) => GuardrailVerdict::deny(format!(
                "{} requires permission '{}'",
                subject, missing
            )),
            None => GuardrailVerdict::allow(),
        }
    }
}

#[async_trait]
impl GuardrailValidator for PermissionGuardrails {
    async fn validate_workflow(&self, workflow: &Workflow, context: &ExecutionContext) -> GuardrailVerdict {
        Self::check(&workflow.guardrails, context, &format!("workflow '{}'", workflow.name))
    }

    async fn validate_step(&self, step: &Step, context: &ExecutionContext) -> GuardrailVerdict {
        Self::check(&step.guardrails, context, &format!("step '{}'", step.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StepType;

    #[tokio::test]
    async fn test_permission_guardrails() {
        let step = Step::new("query", StepType::Database, "db", "select").with_guardrail("db.read");
        let workflow = Workflow::new("report").with_step(step.clone());

        let denied = ExecutionContext::new(workflow.id, "test");
        let verdict = PermissionGuardrails.validate_step(&step, &denied).await;
        assert!(!verdict.compliant);
        assert_eq!(verdict.reason_or_default(), "step 'query' requires permission 'db.read'");

        let allowed = denied.clone().with_permission("db.read");
        assert!(PermissionGuardrails.validate_step(&step, &allowed).await.compliant);
        assert!(PermissionGuardrails.validate_workflow(&workflow, &denied).await.compliant);
    }
}
