//! The execution engine: starts executions for matching triggers, steps
//! them node by node, suspends on wait requests and resumes them with an
//! injected decision.
//!
//! Every persisted transition goes through the store's versioned
//! compare-and-swap, so two callers can never both advance the same
//! execution; the loser observes a conflict and backs off.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{
    Execution, ExecutionStatus, LifecycleEvent, NodeKind, WorkflowDefinition, WorkflowNode,
};
use crate::nodes::{
    should_trigger, ExecutorEnv, NodeExecutorRegistry, NodeRunResult, NodeRunStatus,
    DEFAULT_OUTPUT,
};
use crate::runtime::RuntimeContext;
use crate::services::{HttpWebhookTransport, LogMailer, Mailer, WebhookTransport};
use crate::store::{StoreError, WorkflowStore};

/// Engine-wide policy knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on nodes executed per `step` call; trips on runaway
    /// graph loops.
    pub max_steps: u32,
    /// Base URL approval/view links are built from.
    pub base_url: String,
    /// Default approval token lifetime when a node does not override it.
    pub default_approval_expiry_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_steps: 100,
            base_url: "http://localhost:8080".into(),
            default_approval_expiry_hours: 30 * 24,
        }
    }
}

/// One workflow's reaction to a lifecycle event.
#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    pub workflow_id: i64,
    pub workflow_name: String,
    pub node_id: i64,
    pub execution_id: Option<i64>,
    pub error: Option<String>,
}

/// Result of one expiry sweep pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Executions this pass claimed and re-stepped.
    pub resumed: Vec<i64>,
    /// Executions another caller claimed first, or that failed to step.
    pub skipped: Vec<i64>,
}

pub struct ExecutionEngine {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<NodeExecutorRegistry>,
    runtime: RuntimeContext,
    mailer: Arc<dyn Mailer>,
    webhooks: Arc<dyn WebhookTransport>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        ExecutionEngine {
            store,
            registry: Arc::new(NodeExecutorRegistry::new()),
            runtime: RuntimeContext::default(),
            mailer: Arc::new(LogMailer),
            webhooks: Arc::new(HttpWebhookTransport::new()),
            config: EngineConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<NodeExecutorRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeContext) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_webhooks(mut self, webhooks: Arc<dyn WebhookTransport>) -> Self {
        self.webhooks = webhooks;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Event intake: ask every enabled workflow's entry triggers whether
    /// the event qualifies and start an independent execution per match.
    /// There is no priority ordering between workflows, and one workflow's
    /// failure never blocks another's start.
    pub async fn on_event(
        &self,
        event: &LifecycleEvent,
    ) -> Result<Vec<TriggerOutcome>, EngineError> {
        let document = self.store.document(event.document_id()).await?;
        let mut outcomes = Vec::new();

        for workflow in self.store.workflows(true).await? {
            for node in self.store.nodes(workflow.id).await? {
                if !node.is_entry_point || !node.kind.is_trigger() {
                    continue;
                }
                let matched =
                    match should_trigger(node.kind, &node.config, document.as_ref(), event) {
                        Ok(matched) => matched,
                        Err(e) => {
                            warn!(
                                workflow = workflow.id,
                                node = node.id,
                                error = %e,
                                "trigger evaluation failed"
                            );
                            outcomes.push(TriggerOutcome {
                                workflow_id: workflow.id,
                                workflow_name: workflow.name.clone(),
                                node_id: node.id,
                                execution_id: None,
                                error: Some(e.to_string()),
                            });
                            continue;
                        }
                    };
                if !matched {
                    continue;
                }
                debug!(workflow = workflow.id, node = node.id, "trigger matched");
                match self.start_at(&workflow, &node, event).await {
                    Ok(execution_id) => outcomes.push(TriggerOutcome {
                        workflow_id: workflow.id,
                        workflow_name: workflow.name.clone(),
                        node_id: node.id,
                        execution_id: Some(execution_id),
                        error: None,
                    }),
                    Err(e) => outcomes.push(TriggerOutcome {
                        workflow_id: workflow.id,
                        workflow_name: workflow.name.clone(),
                        node_id: node.id,
                        execution_id: None,
                        error: Some(e.to_string()),
                    }),
                }
            }
        }
        Ok(outcomes)
    }

    /// Start a specific workflow for an event, resolving the first entry
    /// trigger that matches.
    pub async fn start(
        &self,
        workflow_id: i64,
        event: &LifecycleEvent,
    ) -> Result<i64, EngineError> {
        let workflow = self.require_enabled(workflow_id).await?;
        let document = self.store.document(event.document_id()).await?;
        for node in self.store.nodes(workflow.id).await? {
            if !node.is_entry_point || !node.kind.is_trigger() {
                continue;
            }
            if should_trigger(node.kind, &node.config, document.as_ref(), event)? {
                return self.start_at(&workflow, &node, event).await;
            }
        }
        Err(EngineError::NoMatchingTrigger(workflow_id))
    }

    /// Start a workflow through its manual trigger.
    pub async fn start_manual(
        &self,
        workflow_id: i64,
        document_id: Option<i64>,
    ) -> Result<i64, EngineError> {
        let workflow = self.require_enabled(workflow_id).await?;
        let entry = self
            .store
            .nodes(workflow.id)
            .await?
            .into_iter()
            .find(|n| n.is_entry_point && n.kind == NodeKind::TriggerManual)
            .ok_or(EngineError::NoEntryPoint(workflow_id))?;

        let mut execution =
            Execution::new(workflow.id, document_id, entry.id, self.runtime.time.now());
        self.store.insert_execution(&mut execution).await?;
        info!(
            workflow = workflow.id,
            execution = execution.id,
            "manual start"
        );
        self.step(execution.id).await?;
        Ok(execution.id)
    }

    async fn require_enabled(&self, workflow_id: i64) -> Result<WorkflowDefinition, EngineError> {
        let workflow = self
            .store
            .workflow(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;
        if !workflow.enabled {
            return Err(EngineError::WorkflowDisabled(workflow_id));
        }
        Ok(workflow)
    }

    async fn start_at(
        &self,
        workflow: &WorkflowDefinition,
        entry: &WorkflowNode,
        event: &LifecycleEvent,
    ) -> Result<i64, EngineError> {
        let mut execution = Execution::new(
            workflow.id,
            Some(event.document_id()),
            entry.id,
            self.runtime.time.now(),
        );
        event.seed_context(&mut execution.context);
        self.store.insert_execution(&mut execution).await?;
        info!(
            workflow = workflow.id,
            execution = execution.id,
            entry = entry.id,
            "execution created"
        );
        self.step(execution.id).await?;
        Ok(execution.id)
    }

    /// Advance an execution until it completes, fails, suspends or hits
    /// the step limit. A waiting or terminal execution is left untouched.
    pub async fn step(&self, execution_id: i64) -> Result<ExecutionStatus, EngineError> {
        let mut execution = self
            .store
            .execution(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))?;
        match execution.status {
            ExecutionStatus::Pending | ExecutionStatus::Running => {}
            status => return Ok(status),
        }

        // Claim the execution before touching any node.
        execution.status = ExecutionStatus::Running;
        self.persist(&mut execution).await?;

        let run = Uuid::new_v4();
        let mut steps = 0u32;
        loop {
            let Some(node_id) = execution.current_node_id else {
                return self.complete(&mut execution).await;
            };

            steps += 1;
            if steps > self.config.max_steps {
                return self
                    .fail(
                        &mut execution,
                        format!("step limit exceeded ({})", self.config.max_steps),
                    )
                    .await;
            }

            let Some(node) = self.store.node(node_id).await? else {
                return self
                    .fail(&mut execution, format!("node {node_id} not found"))
                    .await;
            };
            let Some(executor) = self.registry.get(node.kind) else {
                return self
                    .fail(
                        &mut execution,
                        format!("no executor registered for node kind {}", node.kind),
                    )
                    .await;
            };

            // Malformed config is a failed terminal outcome, not a skip.
            if let Err(e) =
                crate::nodes::validate_config(&executor.config_schema(), &node.config)
            {
                return self.fail(&mut execution, e.to_string()).await;
            }

            debug!(
                run = %run,
                execution = execution.id,
                node = node.id,
                kind = %node.kind,
                step = steps,
                "executing node"
            );

            let env = self.executor_env(&execution);
            let result = executor.execute(&node, &mut execution.context, &env).await;

            let result = match result {
                Ok(result) => result,
                Err(e) => return self.fail(&mut execution, e.to_string()).await,
            };

            execution.context.merge(result.data.clone());

            match result.status {
                NodeRunStatus::Failed => {
                    let message = result
                        .error
                        .unwrap_or_else(|| "node execution failed".into());
                    return self.fail(&mut execution, message).await;
                }
                NodeRunStatus::Waiting => {
                    return self.suspend(&mut execution, &result).await;
                }
                NodeRunStatus::Succeeded => {
                    match self.next_node(node.id, &result.output).await? {
                        Some(next) => {
                            execution.current_node_id = Some(next);
                            self.persist(&mut execution).await?;
                        }
                        // Dead end after a successful node is normal
                        // completion.
                        None => return self.complete(&mut execution).await,
                    }
                }
            }
        }
    }

    /// Resume a waiting execution with a human decision. The suspended
    /// node is re-entered and consults the injected decision instead of
    /// re-performing its side effect.
    pub async fn resume(
        &self,
        execution_id: i64,
        decision: &str,
        comment: Option<&str>,
    ) -> Result<ExecutionStatus, EngineError> {
        let mut execution = self
            .store
            .execution(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))?;
        if execution.status != ExecutionStatus::Waiting {
            return Err(EngineError::NotWaiting {
                execution_id,
                status: execution.status,
            });
        }

        execution.context.set("decision", decision);
        if let Some(comment) = comment {
            execution.context.set("decision_comment", comment);
        }
        execution.status = ExecutionStatus::Running;
        execution.waiting_until = None;
        execution.waiting_for = None;

        match self.store.update_execution(&mut execution).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                // A concurrent caller claimed the execution first.
                let status = self
                    .store
                    .execution(execution_id)
                    .await?
                    .map(|e| e.status)
                    .unwrap_or(ExecutionStatus::Cancelled);
                return Err(EngineError::NotWaiting {
                    execution_id,
                    status,
                });
            }
            Err(e) => return Err(e.into()),
        }

        info!(execution = execution_id, decision, "execution resumed");
        self.step(execution_id).await
    }

    /// Cancel a non-terminal execution.
    pub async fn cancel(&self, execution_id: i64) -> Result<ExecutionStatus, EngineError> {
        let mut execution = self
            .store
            .execution(execution_id)
            .await?
            .ok_or(EngineError::ExecutionNotFound(execution_id))?;
        if execution.status.is_terminal() {
            return Ok(execution.status);
        }
        execution.status = ExecutionStatus::Cancelled;
        execution.completed_at = Some(self.runtime.time.now());
        execution.waiting_until = None;
        execution.waiting_for = None;
        self.persist(&mut execution).await?;
        info!(execution = execution_id, "execution cancelled");
        Ok(ExecutionStatus::Cancelled)
    }

    /// Idempotent expiry sweep: claim every waiting execution whose
    /// deadline has passed and re-step its suspended node, which decides
    /// between a timeout path and failure. Safe to run from overlapping
    /// schedules; the CAS ensures each expired wait is handled once.
    pub async fn sweep_expired(&self) -> Result<SweepReport, EngineError> {
        let now = self.runtime.time.now();
        let mut report = SweepReport::default();

        for mut execution in self.store.expired_waiting(now).await? {
            let execution_id = execution.id;
            execution.context.set("wait_expired", true);
            execution.status = ExecutionStatus::Running;
            execution.waiting_until = None;
            execution.waiting_for = None;

            match self.store.update_execution(&mut execution).await {
                Err(StoreError::Conflict(_)) => {
                    report.skipped.push(execution_id);
                    continue;
                }
                Err(e) => return Err(e.into()),
                Ok(()) => {}
            }

            match self.step(execution_id).await {
                Ok(_) => report.resumed.push(execution_id),
                Err(e) => {
                    warn!(execution = execution_id, error = %e, "expired execution failed to step");
                    report.skipped.push(execution_id);
                }
            }
        }
        Ok(report)
    }

    // --- internals ---

    fn executor_env(&self, execution: &Execution) -> ExecutorEnv {
        ExecutorEnv {
            store: self.store.clone(),
            runtime: self.runtime.clone(),
            mailer: self.mailer.clone(),
            webhooks: self.webhooks.clone(),
            config: self.config.clone(),
            execution_id: execution.id,
            workflow_id: execution.workflow_id,
            document_id: execution.document_id,
        }
    }

    /// Lowest-`order` connection with an exact output match, falling back
    /// to a `"default"`-labeled connection.
    async fn next_node(
        &self,
        from_node_id: i64,
        output: &str,
    ) -> Result<Option<i64>, EngineError> {
        let connections = self.store.connections_from(from_node_id).await?;
        if let Some(conn) = connections.iter().find(|c| c.output_name == output) {
            return Ok(Some(conn.to_node_id));
        }
        Ok(connections
            .iter()
            .find(|c| c.output_name == DEFAULT_OUTPUT)
            .map(|c| c.to_node_id))
    }

    async fn persist(&self, execution: &mut Execution) -> Result<(), EngineError> {
        match self.store.update_execution(execution).await {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict(id)) => Err(EngineError::Conflict(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn complete(
        &self,
        execution: &mut Execution,
    ) -> Result<ExecutionStatus, EngineError> {
        execution.status = ExecutionStatus::Completed;
        execution.completed_at = Some(self.runtime.time.now());
        execution.current_node_id = None;
        self.persist(execution).await?;
        info!(execution = execution.id, "execution completed");
        Ok(ExecutionStatus::Completed)
    }

    async fn fail(
        &self,
        execution: &mut Execution,
        message: String,
    ) -> Result<ExecutionStatus, EngineError> {
        warn!(execution = execution.id, error = %message, "execution failed");
        execution.status = ExecutionStatus::Failed;
        execution.error_message = Some(message);
        execution.completed_at = Some(self.runtime.time.now());
        self.persist(execution).await?;
        Ok(ExecutionStatus::Failed)
    }

    async fn suspend(
        &self,
        execution: &mut Execution,
        result: &NodeRunResult,
    ) -> Result<ExecutionStatus, EngineError> {
        let wait = result.wait.clone().unwrap_or_default();
        execution.status = ExecutionStatus::Waiting;
        execution.waiting_for = wait.waiting_for;
        execution.waiting_until = wait
            .wait_seconds
            .map(|secs| self.runtime.time.now() + chrono::Duration::seconds(secs));
        self.persist(execution).await?;
        debug!(
            execution = execution.id,
            waiting_until = ?execution.waiting_until,
            "execution suspended"
        );
        Ok(ExecutionStatus::Waiting)
    }
}
