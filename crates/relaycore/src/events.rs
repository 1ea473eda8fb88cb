use crate::{StepId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    WorkflowStarted {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        execution_id: ExecutionId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    WorkflowCancelled {
        execution_id: ExecutionId,
        timestamp: DateTime<Utc>,
    },
    StepStarted {
        execution_id: ExecutionId,
        step_id: StepId,
        component: String,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        execution_id: ExecutionId,
        step_id: StepId,
        attempt: u32,
        used_fallback: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    StepFailed {
        execution_id: ExecutionId,
        step_id: StepId,
        error: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    StepRetrying {
        execution_id: ExecutionId,
        step_id: StepId,
        attempt: u32,
        delay_ms: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },
    FallbackUsed {
        execution_id: ExecutionId,
        step_id: StepId,
        strategy: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },
    RecoveryInvoked {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        recovered: bool,
        message: String,
        timestamp: DateTime<Utc>,
    },
    StepEvent {
        execution_id: ExecutionId,
        step_id: StepId,
        event: StepEvent,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionEvent::WorkflowStarted { execution_id, .. }
            | ExecutionEvent::WorkflowCompleted { execution_id, .. }
            | ExecutionEvent::WorkflowCancelled { execution_id, .. }
            | ExecutionEvent::StepStarted { execution_id, .. }
            | ExecutionEvent::StepCompleted { execution_id, .. }
            | ExecutionEvent::StepFailed { execution_id, .. }
            | ExecutionEvent::StepRetrying { execution_id, .. }
            | ExecutionEvent::FallbackUsed { execution_id, .. }
            | ExecutionEvent::RecoveryInvoked { execution_id, .. }
            | ExecutionEvent::StepEvent { execution_id, .. } => *execution_id,
        }
    }
}

/// Messages a component reports while it runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum StepEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
}

/// Sender scoped to a single execution. Sending never fails the run: with
/// no subscribers the event is dropped.
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(execution_id: ExecutionId, sender: broadcast::Sender<ExecutionEvent>) -> Self {
        Self {
            execution_id,
            sender,
        }
    }

    /// Emitter with nobody listening
    pub fn detached(execution_id: ExecutionId) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self::new(execution_id, sender)
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    /// Emit a component-level event for one step
    pub fn step_event(&self, step_id: &str, event: StepEvent) {
        self.emit(ExecutionEvent::StepEvent {
            execution_id: self.execution_id,
            step_id: step_id.to_string(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, step_id: &str, message: impl Into<String>) {
        self.step_event(step_id, StepEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, step_id: &str, message: impl Into<String>) {
        self.step_event(step_id, StepEvent::Warning {
            message: message.into(),
        });
    }

    pub fn progress(&self, step_id: &str, percent: f64, message: Option<String>) {
        self.step_event(step_id, StepEvent::Progress { percent, message });
    }
}

/// Event channel owned by one engine instance
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId) -> EventEmitter {
        EventEmitter::new(execution_id, self.sender.clone())
    }
}
