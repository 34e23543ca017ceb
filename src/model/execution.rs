use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ContextBag;

/// Execution status of a workflow instance.
///
/// `pending → running → {waiting ⇄ running} → {completed | failed | cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// A durable, resumable traversal of a workflow graph.
///
/// `version` backs the optimistic concurrency check: every persisted update
/// compares and bumps it, so two callers can never both advance the same
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: i64,
    pub workflow_id: i64,
    pub document_id: Option<i64>,
    pub status: ExecutionStatus,
    pub current_node_id: Option<i64>,
    #[serde(default)]
    pub context: ContextBag,
    pub waiting_until: Option<DateTime<Utc>>,
    pub waiting_for: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Execution {
    /// A fresh execution positioned at its entry node.
    pub fn new(
        workflow_id: i64,
        document_id: Option<i64>,
        entry_node_id: i64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Execution {
            id: 0,
            workflow_id,
            document_id,
            status: ExecutionStatus::Pending,
            current_node_id: Some(entry_node_id),
            context: ContextBag::default(),
            waiting_until: None,
            waiting_for: None,
            error_message: None,
            started_at,
            completed_at: None,
            version: 0,
        }
    }
}
