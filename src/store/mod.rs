//! Storage seam. The engine, approval service and manager are written
//! against [`WorkflowStore`]; tests and the demo binary use the in-memory
//! implementation, a persistent deployment provides its own.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    ApprovalToken, Decision, DecisionRecord, Document, Execution, TagRef, ValidationEvent,
    ValidationStatus, WorkflowConnection, WorkflowDefinition, WorkflowNode,
};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic version check lost against a concurrent writer.
    #[error("Version conflict on execution {0}")]
    Conflict(i64),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Outcome of an atomic token consumption attempt.
#[derive(Debug, Clone)]
pub enum TokenConsumption {
    /// This caller won; the token is now marked responded.
    Consumed(ApprovalToken),
    /// Someone already responded; carries the recorded decision untouched.
    AlreadyResponded(ApprovalToken),
    /// Past `expires_at`; nothing was mutated.
    Expired(ApprovalToken),
}

/// Validation change applied to a document by an approval resolution or a
/// `set_validation` action.
#[derive(Debug, Clone)]
pub struct ValidationChange {
    pub status: ValidationStatus,
    pub level: i32,
    pub validated_by: Option<i64>,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // --- workflow definitions ---

    /// Assigns `def.id`. Fails with [`StoreError::Constraint`] when the
    /// name is taken.
    async fn insert_workflow(&self, def: &mut WorkflowDefinition) -> Result<(), StoreError>;
    async fn update_workflow(&self, def: &WorkflowDefinition) -> Result<(), StoreError>;
    /// Cascades over the workflow's nodes and connections.
    async fn delete_workflow(&self, workflow_id: i64) -> Result<(), StoreError>;
    async fn workflow(&self, workflow_id: i64) -> Result<Option<WorkflowDefinition>, StoreError>;
    async fn workflow_by_name(&self, name: &str)
        -> Result<Option<WorkflowDefinition>, StoreError>;
    async fn workflows(&self, enabled_only: bool) -> Result<Vec<WorkflowDefinition>, StoreError>;

    // --- graph ---

    async fn insert_node(&self, node: &mut WorkflowNode) -> Result<(), StoreError>;
    async fn delete_nodes(&self, workflow_id: i64) -> Result<(), StoreError>;
    async fn nodes(&self, workflow_id: i64) -> Result<Vec<WorkflowNode>, StoreError>;
    async fn node(&self, node_id: i64) -> Result<Option<WorkflowNode>, StoreError>;
    async fn insert_connection(&self, conn: &mut WorkflowConnection) -> Result<(), StoreError>;
    async fn delete_connections(&self, workflow_id: i64) -> Result<(), StoreError>;
    async fn connections(&self, workflow_id: i64) -> Result<Vec<WorkflowConnection>, StoreError>;
    async fn connections_from(
        &self,
        from_node_id: i64,
    ) -> Result<Vec<WorkflowConnection>, StoreError>;

    // --- executions ---

    async fn insert_execution(&self, execution: &mut Execution) -> Result<(), StoreError>;
    async fn execution(&self, execution_id: i64) -> Result<Option<Execution>, StoreError>;
    /// Compare-and-swap on `execution.version`: persists and bumps the
    /// version, or fails with [`StoreError::Conflict`] if another caller
    /// advanced the row first.
    async fn update_execution(&self, execution: &mut Execution) -> Result<(), StoreError>;
    /// Waiting executions whose `waiting_until` deadline has passed.
    async fn expired_waiting(&self, now: DateTime<Utc>) -> Result<Vec<Execution>, StoreError>;

    // --- approval tokens ---

    async fn insert_token(&self, token: &mut ApprovalToken) -> Result<(), StoreError>;
    async fn token_by_value(&self, token: &str) -> Result<Option<ApprovalToken>, StoreError>;
    /// Most recent unanswered token of an execution, if any.
    async fn latest_open_token(
        &self,
        execution_id: i64,
    ) -> Result<Option<ApprovalToken>, StoreError>;
    /// Atomic single-use consumption: checks `responded_at`, then expiry,
    /// then records the response — all under one lock/transaction. This is
    /// the primary concurrency guard of the approval path.
    async fn consume_token(
        &self,
        token_id: i64,
        decision: Decision,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TokenConsumption, StoreError>;

    // --- decision history ---

    async fn append_decision(&self, record: &mut DecisionRecord) -> Result<(), StoreError>;
    async fn decisions(&self, execution_id: i64) -> Result<Vec<DecisionRecord>, StoreError>;

    // --- documents ---

    async fn insert_document(&self, document: &mut Document) -> Result<(), StoreError>;
    async fn document(&self, document_id: i64) -> Result<Option<Document>, StoreError>;
    async fn add_document_tags(&self, document_id: i64, tags: &[TagRef])
        -> Result<(), StoreError>;
    async fn assign_document(
        &self,
        document_id: i64,
        user_id: Option<i64>,
        group_id: Option<i64>,
    ) -> Result<(), StoreError>;
    /// Applies the change and appends a validation-history entry.
    async fn set_document_validation(
        &self,
        document_id: i64,
        change: ValidationChange,
    ) -> Result<(), StoreError>;
    async fn validation_history(
        &self,
        document_id: i64,
    ) -> Result<Vec<ValidationEvent>, StoreError>;
}
