use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use super::{StoreError, TokenConsumption, ValidationChange, WorkflowStore};
use crate::model::{
    ApprovalToken, Decision, DecisionRecord, Document, Execution, ExecutionStatus, TagRef,
    ValidationEvent, WorkflowConnection, WorkflowDefinition, WorkflowNode,
};

/// In-memory store. Single writer lock per operation, which also makes
/// `consume_token` and the execution version check atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    next_id: AtomicI64,
}

#[derive(Default)]
struct Inner {
    workflows: HashMap<i64, WorkflowDefinition>,
    nodes: HashMap<i64, WorkflowNode>,
    connections: HashMap<i64, WorkflowConnection>,
    executions: HashMap<i64, Execution>,
    tokens: HashMap<i64, ApprovalToken>,
    decisions: Vec<DecisionRecord>,
    documents: HashMap<i64, Document>,
    validation_history: Vec<ValidationEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicI64::new(1),
        }
    }

    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn insert_workflow(&self, def: &mut WorkflowDefinition) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.workflows.values().any(|w| w.name == def.name) {
            return Err(StoreError::Constraint(format!(
                "workflow name already exists: {}",
                def.name
            )));
        }
        def.id = self.alloc_id();
        inner.workflows.insert(def.id, def.clone());
        Ok(())
    }

    async fn update_workflow(&self, def: &WorkflowDefinition) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .workflows
            .values()
            .any(|w| w.id != def.id && w.name == def.name)
        {
            return Err(StoreError::Constraint(format!(
                "workflow name already exists: {}",
                def.name
            )));
        }
        match inner.workflows.get_mut(&def.id) {
            Some(existing) => {
                *existing = def.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("workflow {}", def.id))),
        }
    }

    async fn delete_workflow(&self, workflow_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.workflows.remove(&workflow_id);
        inner.nodes.retain(|_, n| n.workflow_id != workflow_id);
        inner
            .connections
            .retain(|_, c| c.workflow_id != workflow_id);
        Ok(())
    }

    async fn workflow(&self, workflow_id: i64) -> Result<Option<WorkflowDefinition>, StoreError> {
        Ok(self.inner.read().await.workflows.get(&workflow_id).cloned())
    }

    async fn workflow_by_name(
        &self,
        name: &str,
    ) -> Result<Option<WorkflowDefinition>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .workflows
            .values()
            .find(|w| w.name == name)
            .cloned())
    }

    async fn workflows(&self, enabled_only: bool) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let inner = self.inner.read().await;
        let mut out: Vec<_> = inner
            .workflows
            .values()
            .filter(|w| !enabled_only || w.enabled)
            .cloned()
            .collect();
        out.sort_by_key(|w| w.id);
        Ok(out)
    }

    async fn insert_node(&self, node: &mut WorkflowNode) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        node.id = self.alloc_id();
        inner.nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn delete_nodes(&self, workflow_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.nodes.retain(|_, n| n.workflow_id != workflow_id);
        Ok(())
    }

    async fn nodes(&self, workflow_id: i64) -> Result<Vec<WorkflowNode>, StoreError> {
        let inner = self.inner.read().await;
        let mut out: Vec<_> = inner
            .nodes
            .values()
            .filter(|n| n.workflow_id == workflow_id)
            .cloned()
            .collect();
        out.sort_by_key(|n| n.id);
        Ok(out)
    }

    async fn node(&self, node_id: i64) -> Result<Option<WorkflowNode>, StoreError> {
        Ok(self.inner.read().await.nodes.get(&node_id).cloned())
    }

    async fn insert_connection(&self, conn: &mut WorkflowConnection) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        conn.id = self.alloc_id();
        inner.connections.insert(conn.id, conn.clone());
        Ok(())
    }

    async fn delete_connections(&self, workflow_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .connections
            .retain(|_, c| c.workflow_id != workflow_id);
        Ok(())
    }

    async fn connections(&self, workflow_id: i64) -> Result<Vec<WorkflowConnection>, StoreError> {
        let inner = self.inner.read().await;
        let mut out: Vec<_> = inner
            .connections
            .values()
            .filter(|c| c.workflow_id == workflow_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.id);
        Ok(out)
    }

    async fn connections_from(
        &self,
        from_node_id: i64,
    ) -> Result<Vec<WorkflowConnection>, StoreError> {
        let inner = self.inner.read().await;
        let mut out: Vec<_> = inner
            .connections
            .values()
            .filter(|c| c.from_node_id == from_node_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| (c.order, c.id));
        Ok(out)
    }

    async fn insert_execution(&self, execution: &mut Execution) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        execution.id = self.alloc_id();
        execution.version = 1;
        inner.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn execution(&self, execution_id: i64) -> Result<Option<Execution>, StoreError> {
        Ok(self.inner.read().await.executions.get(&execution_id).cloned())
    }

    async fn update_execution(&self, execution: &mut Execution) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .executions
            .get_mut(&execution.id)
            .ok_or_else(|| StoreError::NotFound(format!("execution {}", execution.id)))?;
        if stored.version != execution.version {
            return Err(StoreError::Conflict(execution.id));
        }
        execution.version += 1;
        *stored = execution.clone();
        Ok(())
    }

    async fn expired_waiting(&self, now: DateTime<Utc>) -> Result<Vec<Execution>, StoreError> {
        let inner = self.inner.read().await;
        let mut out: Vec<_> = inner
            .executions
            .values()
            .filter(|e| {
                e.status == ExecutionStatus::Waiting
                    && e.waiting_until.map(|until| until <= now).unwrap_or(false)
            })
            .cloned()
            .collect();
        out.sort_by_key(|e| e.id);
        Ok(out)
    }

    async fn insert_token(&self, token: &mut ApprovalToken) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        token.id = self.alloc_id();
        inner.tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn token_by_value(&self, token: &str) -> Result<Option<ApprovalToken>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .tokens
            .values()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn latest_open_token(
        &self,
        execution_id: i64,
    ) -> Result<Option<ApprovalToken>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .tokens
            .values()
            .filter(|t| t.execution_id == execution_id && !t.is_responded())
            .max_by_key(|t| t.id)
            .cloned())
    }

    async fn consume_token(
        &self,
        token_id: i64,
        decision: Decision,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TokenConsumption, StoreError> {
        let mut inner = self.inner.write().await;
        let token = inner
            .tokens
            .get_mut(&token_id)
            .ok_or_else(|| StoreError::NotFound(format!("approval token {token_id}")))?;
        if token.is_responded() {
            return Ok(TokenConsumption::AlreadyResponded(token.clone()));
        }
        if token.is_expired(now) {
            return Ok(TokenConsumption::Expired(token.clone()));
        }
        token.response_action = Some(decision);
        token.response_comment = comment;
        token.responded_at = Some(now);
        Ok(TokenConsumption::Consumed(token.clone()))
    }

    async fn append_decision(&self, record: &mut DecisionRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        record.id = self.alloc_id();
        inner.decisions.push(record.clone());
        Ok(())
    }

    async fn decisions(&self, execution_id: i64) -> Result<Vec<DecisionRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .decisions
            .iter()
            .filter(|d| d.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn insert_document(&self, document: &mut Document) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if document.id == 0 {
            document.id = self.alloc_id();
        }
        inner.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn document(&self, document_id: i64) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.read().await.documents.get(&document_id).cloned())
    }

    async fn add_document_tags(
        &self,
        document_id: i64,
        tags: &[TagRef],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))?;
        for tag in tags {
            if !doc.tags.iter().any(|t| t.id == tag.id) {
                doc.tags.push(tag.clone());
            }
        }
        Ok(())
    }

    async fn assign_document(
        &self,
        document_id: i64,
        user_id: Option<i64>,
        group_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))?;
        if user_id.is_some() {
            doc.assigned_user_id = user_id;
        }
        if group_id.is_some() {
            doc.assigned_group_id = group_id;
        }
        Ok(())
    }

    async fn set_document_validation(
        &self,
        document_id: i64,
        change: ValidationChange,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let doc = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))?;
        let from_status = Some(doc.validation_status);
        doc.validation_status = change.status;
        doc.validation_level = change.level;
        doc.validated_by = change.validated_by;
        doc.validated_at = Some(change.at);
        doc.validation_comment = change.comment.clone();
        inner.validation_history.push(ValidationEvent {
            document_id,
            from_status,
            to_status: change.status,
            performed_by: change.validated_by,
            comment: change.comment,
            at: change.at,
        });
        Ok(())
    }

    async fn validation_history(
        &self,
        document_id: i64,
    ) -> Result<Vec<ValidationEvent>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .validation_history
            .iter()
            .filter(|e| e.document_id == document_id)
            .cloned()
            .collect())
    }
}
