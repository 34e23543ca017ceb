use thiserror::Error;

use super::NodeError;
use crate::graph::ValidationReport;
use crate::model::{ExecutionStatus, NodeKind};
use crate::store::StoreError;

/// Workflow/engine-level errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(i64),
    #[error("Workflow {0} is disabled")]
    WorkflowDisabled(i64),
    #[error("Workflow {0} has no entry point for this start mode")]
    NoEntryPoint(i64),
    #[error("No entry trigger of workflow {0} matches the event")]
    NoMatchingTrigger(i64),
    #[error("Execution not found: {0}")]
    ExecutionNotFound(i64),
    #[error("Node not found: {0}")]
    NodeNotFound(i64),
    #[error("No executor registered for node kind: {0}")]
    ExecutorNotRegistered(NodeKind),
    #[error("Execution {execution_id} is not waiting (status: {status:?})")]
    NotWaiting {
        execution_id: i64,
        status: ExecutionStatus,
    },
    #[error("Concurrent update lost on execution {0}")]
    Conflict(i64),
    #[error("Workflow name already taken: {name} (suggested: {suggested})")]
    NameTaken { name: String, suggested: String },
    #[error("Validation failed")]
    ValidationFailed(Box<ValidationReport>),
    #[error("Node error: {0}")]
    Node(#[from] NodeError),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}
