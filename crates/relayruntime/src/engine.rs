use crate::execution::{ExecutionStatus, WorkflowExecution};
use crate::executor::StepExecutor;
use crate::registry::ComponentRegistry;
use crate::{RuntimeConfig, RuntimeError};
use chrono::Utc;
use futures::FutureExt;
use relaycore::{
    AllowAll, EventBus, ExecutionContext, ExecutionEvent, ExecutionId, FailureRecovery,
    FailureReport, GuardrailValidator, LoggingRecovery, Workflow, WorkflowResult,
};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;

/// Supervises concurrent workflow executions.
///
/// Each submitted workflow runs on its own task. At most
/// `max_concurrent_executions` run at once; the rest wait for a slot while
/// already visible in the registry. Cloning the engine shares its state.
#[derive(Clone)]
pub struct WorkflowEngine {
    config: RuntimeConfig,
    registry: Arc<ComponentRegistry>,
    executor: Arc<StepExecutor>,
    recovery: Arc<dyn FailureRecovery>,
    event_bus: Arc<EventBus>,
    active: Arc<RwLock<HashMap<ExecutionId, Arc<WorkflowExecution>>>>,
    slots: Arc<Semaphore>,
    drained: Arc<Notify>,
    shutting_down: Arc<AtomicBool>,
}

/// A submitted execution that can be awaited
pub struct ExecutionHandle {
    pub execution_id: ExecutionId,
    join: JoinHandle<Result<WorkflowResult, RuntimeError>>,
}

impl ExecutionHandle {
    /// Wait for the execution to finish
    pub async fn wait(self) -> Result<WorkflowResult, RuntimeError> {
        self.join
            .await
            .map_err(|e| RuntimeError::Execution(format!("Task join error: {}", e)))?
    }
}

impl WorkflowEngine {
    /// Create an engine with an empty registry and default settings
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ComponentRegistry::new()), RuntimeConfig::default())
    }

    /// Create an engine over a pre-populated registry
    pub fn with_registry(registry: Arc<ComponentRegistry>, config: RuntimeConfig) -> Self {
        let executor = Arc::new(StepExecutor::new(
            registry.clone(),
            Arc::new(AllowAll),
            config.default_step_timeout(),
        ));

        Self {
            registry,
            executor,
            recovery: Arc::new(LoggingRecovery),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
            active: Arc::new(RwLock::new(HashMap::new())),
            slots: Arc::new(Semaphore::new(config.max_concurrent_executions.max(1))),
            drained: Arc::new(Notify::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    pub fn with_guardrails(mut self, guardrails: Arc<dyn GuardrailValidator>) -> Self {
        self.executor = Arc::new(StepExecutor::new(
            self.registry.clone(),
            guardrails,
            self.config.default_step_timeout(),
        ));
        self
    }

    pub fn with_recovery(mut self, recovery: Arc<dyn FailureRecovery>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Subscribe to execution events of every run on this engine
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Run a workflow and wait for its result
    pub async fn execute_workflow(
        &self,
        workflow: Workflow,
        context: ExecutionContext,
    ) -> Result<WorkflowResult, RuntimeError> {
        self.submit(workflow, context).await?.wait().await
    }

    /// Register a new execution and start it on its own task
    pub async fn submit(
        &self,
        workflow: Workflow,
        context: ExecutionContext,
    ) -> Result<ExecutionHandle, RuntimeError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(RuntimeError::ShuttingDown);
        }

        let execution_id = ExecutionId::new_v4();
        let execution = Arc::new(
            WorkflowExecution::new(execution_id, Arc::new(workflow), context, self.executor.clone())
                .with_events(self.event_bus.create_emitter(execution_id))
                .with_poll_interval(self.config.deadlock_poll_interval()),
        );

        self.active.write().await.insert(execution_id, execution.clone());
        tracing::debug!("Registered execution {}", execution_id);

        // Shutdown may have started while this run was being registered
        if self.shutting_down.load(Ordering::SeqCst) {
            execution.cancel().await;
        }

        let engine = self.clone();
        let join = tokio::spawn(async move { engine.supervise(execution).await });

        Ok(ExecutionHandle { execution_id, join })
    }

    async fn supervise(&self, execution: Arc<WorkflowExecution>) -> Result<WorkflowResult, RuntimeError> {
        let result = match self.slots.clone().acquire_owned().await {
            Ok(_permit) => AssertUnwindSafe(execution.run())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(RuntimeError::Execution(format!(
                        "Execution {} panicked",
                        execution.id()
                    )))
                }),
            Err(_) => Err(RuntimeError::ShuttingDown),
        };

        self.unregister(execution.id()).await;

        if let Err(e) = &result {
            self.report_failure(&execution, e).await;
        }
        result
    }

    /// Hand the failure to the recovery side channel. Its outcome is only
    /// logged and emitted; the caller still receives the original error.
    async fn report_failure(&self, execution: &WorkflowExecution, error: &RuntimeError) {
        let report = FailureReport {
            workflow_id: execution.workflow().id,
            execution_id: execution.id(),
            step_id: execution.failing_step().await,
            error: error.to_string(),
            context: execution.context().clone(),
            timestamp: Utc::now(),
        };

        let outcome = self.recovery.handle_failure(&report).await;
        tracing::info!(
            "Recovery for execution {}: recovered={} ({})",
            execution.id(),
            outcome.recovered,
            outcome.message
        );
        self.event_bus.emit(ExecutionEvent::RecoveryInvoked {
            execution_id: execution.id(),
            workflow_id: report.workflow_id,
            recovered: outcome.recovered,
            message: outcome.message,
            timestamp: Utc::now(),
        });
    }

    async fn unregister(&self, execution_id: ExecutionId) {
        self.active.write().await.remove(&execution_id);
        tracing::debug!("Unregistered execution {}", execution_id);
        self.drained.notify_waiters();
    }

    /// Status of an active execution
    pub async fn execution_status(&self, execution_id: ExecutionId) -> Option<ExecutionStatus> {
        let execution = self.active.read().await.get(&execution_id).cloned()?;
        Some(execution.status().await)
    }

    /// Cancel an active execution
    pub async fn cancel_execution(&self, execution_id: ExecutionId) -> Result<(), RuntimeError> {
        let execution = self
            .active
            .read()
            .await
            .get(&execution_id)
            .cloned()
            .ok_or(RuntimeError::ExecutionNotFound(execution_id))?;
        execution.cancel().await;
        Ok(())
    }

    /// Status of every active execution
    pub async fn active_executions(&self) -> Vec<ExecutionStatus> {
        let executions: Vec<Arc<WorkflowExecution>> = self.active.read().await.values().cloned().collect();
        let mut statuses = Vec::with_capacity(executions.len());
        for execution in executions {
            statuses.push(execution.status().await);
        }
        statuses
    }

    /// Reject new submissions, cancel every active execution and wait until
    /// all of them have unregistered
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let executions: Vec<Arc<WorkflowExecution>> = self.active.read().await.values().cloned().collect();
        tracing::info!("Shutting down engine, cancelling {} execution(s)", executions.len());
        for execution in executions {
            execution.cancel().await;
        }

        loop {
            let drained = self.drained.notified();
            let remaining: Vec<Arc<WorkflowExecution>> = self.active.read().await.values().cloned().collect();
            if remaining.is_empty() {
                break;
            }
            for execution in remaining.iter().filter(|e| !e.is_cancelled()) {
                execution.cancel().await;
            }
            drained.await;
        }
        tracing::info!("Engine shut down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}
