//! Workflow CRUD: the save-time half of the designer API. Validates the
//! graph before persisting, enforces name uniqueness with a suggested
//! alternate, and bumps the definition version on every update.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::EngineError;
use crate::graph::{validate_workflow, ValidationReport};
use crate::model::{NodeKind, WorkflowConnection, WorkflowDefinition, WorkflowNode};
use crate::nodes::{NodeExecutorRegistry, DEFAULT_OUTPUT};
use crate::store::WorkflowStore;

/// Designer payload for a whole workflow. Nodes are referenced by a
/// client-chosen `key` until the store assigns real ids.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub canvas_data: Option<Value>,
    pub nodes: Vec<NodeDraft>,
    #[serde(default)]
    pub connections: Vec<ConnectionDraft>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDraft {
    pub key: String,
    pub kind: NodeKind,
    pub name: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub is_entry_point: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionDraft {
    pub from: String,
    pub to: String,
    #[serde(default = "default_output")]
    pub output_name: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_output() -> String {
    DEFAULT_OUTPUT.to_string()
}

/// A workflow with its nodes and connections, as stored.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    pub definition: WorkflowDefinition,
    pub nodes: Vec<WorkflowNode>,
    pub connections: Vec<WorkflowConnection>,
}

pub struct WorkflowManager {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<NodeExecutorRegistry>,
}

impl WorkflowManager {
    pub fn new(store: Arc<dyn WorkflowStore>, registry: Arc<NodeExecutorRegistry>) -> Self {
        WorkflowManager { store, registry }
    }

    pub async fn create_workflow(
        &self,
        draft: WorkflowDraft,
    ) -> Result<WorkflowGraph, EngineError> {
        self.check_name(&draft.name, None).await?;
        self.check_draft(&draft)?;

        let mut definition = WorkflowDefinition {
            id: 0,
            name: draft.name.clone(),
            description: draft.description.clone(),
            enabled: draft.enabled,
            version: 1,
            canvas_data: draft.canvas_data.clone(),
        };
        self.store.insert_workflow(&mut definition).await?;
        let (nodes, connections) = self.persist_graph(definition.id, &draft).await?;

        info!(workflow = definition.id, name = %definition.name, "workflow created");
        Ok(WorkflowGraph {
            definition,
            nodes,
            connections,
        })
    }

    /// Full-replace update, as the designer saves whole graphs: the
    /// definition is bumped, old nodes and connections are dropped and the
    /// draft's are written in their place. In-flight executions keep their
    /// node ids only as long as the caller preserves them; the designer is
    /// expected to block edits on workflows with running executions.
    pub async fn update_workflow(
        &self,
        workflow_id: i64,
        draft: WorkflowDraft,
    ) -> Result<WorkflowGraph, EngineError> {
        let existing = self
            .store
            .workflow(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;
        self.check_name(&draft.name, Some(workflow_id)).await?;
        self.check_draft(&draft)?;

        let definition = WorkflowDefinition {
            id: workflow_id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            enabled: draft.enabled,
            version: existing.version + 1,
            canvas_data: draft.canvas_data.clone(),
        };
        self.store.update_workflow(&definition).await?;
        self.store.delete_nodes(workflow_id).await?;
        self.store.delete_connections(workflow_id).await?;
        let (nodes, connections) = self.persist_graph(workflow_id, &draft).await?;

        info!(workflow = workflow_id, version = definition.version, "workflow updated");
        Ok(WorkflowGraph {
            definition,
            nodes,
            connections,
        })
    }

    pub async fn delete_workflow(&self, workflow_id: i64) -> Result<(), EngineError> {
        self.store.delete_workflow(workflow_id).await?;
        info!(workflow = workflow_id, "workflow deleted");
        Ok(())
    }

    /// Disabling excludes the workflow from trigger matching; already
    /// waiting executions still resume.
    pub async fn set_enabled(&self, workflow_id: i64, enabled: bool) -> Result<(), EngineError> {
        let mut definition = self
            .store
            .workflow(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;
        definition.enabled = enabled;
        self.store.update_workflow(&definition).await?;
        Ok(())
    }

    pub async fn workflow(&self, workflow_id: i64) -> Result<Option<WorkflowGraph>, EngineError> {
        let Some(definition) = self.store.workflow(workflow_id).await? else {
            return Ok(None);
        };
        let nodes = self.store.nodes(workflow_id).await?;
        let connections = self.store.connections(workflow_id).await?;
        Ok(Some(WorkflowGraph {
            definition,
            nodes,
            connections,
        }))
    }

    pub async fn list_workflows(
        &self,
        enabled_only: bool,
    ) -> Result<Vec<WorkflowDefinition>, EngineError> {
        Ok(self.store.workflows(enabled_only).await?)
    }

    /// Validate a draft without persisting it (the designer's lint pass).
    pub fn validate_draft(&self, draft: &WorkflowDraft) -> ValidationReport {
        let (nodes, connections, _) = materialize_draft(draft);
        validate_workflow(&nodes, &connections, &self.registry)
    }

    async fn check_name(
        &self,
        name: &str,
        exclude_workflow: Option<i64>,
    ) -> Result<(), EngineError> {
        let taken = match self.store.workflow_by_name(name).await? {
            Some(existing) => Some(existing.id) != exclude_workflow,
            None => false,
        };
        if taken {
            let suggested = self.suggest_name(name).await?;
            return Err(EngineError::NameTaken {
                name: name.to_string(),
                suggested,
            });
        }
        Ok(())
    }

    async fn suggest_name(&self, name: &str) -> Result<String, EngineError> {
        for n in 2..100 {
            let candidate = format!("{name} ({n})");
            if self.store.workflow_by_name(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Ok(format!("{name} (copy)"))
    }

    fn check_draft(&self, draft: &WorkflowDraft) -> Result<(), EngineError> {
        let report = self.validate_draft(draft);
        if !report.is_valid() {
            return Err(EngineError::ValidationFailed(Box::new(report)));
        }
        Ok(())
    }

    async fn persist_graph(
        &self,
        workflow_id: i64,
        draft: &WorkflowDraft,
    ) -> Result<(Vec<WorkflowNode>, Vec<WorkflowConnection>), EngineError> {
        let mut key_to_id: HashMap<&str, i64> = HashMap::new();
        let mut nodes = Vec::with_capacity(draft.nodes.len());
        for node_draft in &draft.nodes {
            let mut node = WorkflowNode {
                id: 0,
                workflow_id,
                kind: node_draft.kind,
                name: node_draft.name.clone(),
                config: node_draft.config.clone(),
                is_entry_point: node_draft.is_entry_point,
            };
            self.store.insert_node(&mut node).await?;
            key_to_id.insert(node_draft.key.as_str(), node.id);
            nodes.push(node);
        }

        let mut connections = Vec::with_capacity(draft.connections.len());
        for conn_draft in &draft.connections {
            // Endpoint existence was already validated against the draft.
            let (Some(from), Some(to)) = (
                key_to_id.get(conn_draft.from.as_str()),
                key_to_id.get(conn_draft.to.as_str()),
            ) else {
                continue;
            };
            let mut conn = WorkflowConnection {
                id: 0,
                workflow_id,
                from_node_id: *from,
                to_node_id: *to,
                output_name: conn_draft.output_name.clone(),
                order: conn_draft.order,
                label: conn_draft.label.clone(),
            };
            self.store.insert_connection(&mut conn).await?;
            connections.push(conn);
        }
        Ok((nodes, connections))
    }
}

/// Give draft nodes synthetic ids so the validator can run before
/// anything is persisted.
fn materialize_draft(
    draft: &WorkflowDraft,
) -> (
    Vec<WorkflowNode>,
    Vec<WorkflowConnection>,
    HashMap<&str, i64>,
) {
    let mut key_to_id: HashMap<&str, i64> = HashMap::new();
    let mut nodes = Vec::with_capacity(draft.nodes.len());
    for (i, node_draft) in draft.nodes.iter().enumerate() {
        let id = (i + 1) as i64;
        key_to_id.insert(node_draft.key.as_str(), id);
        nodes.push(WorkflowNode {
            id,
            workflow_id: 0,
            kind: node_draft.kind,
            name: node_draft.name.clone(),
            config: node_draft.config.clone(),
            is_entry_point: node_draft.is_entry_point,
        });
    }
    let mut connections = Vec::with_capacity(draft.connections.len());
    for (i, conn_draft) in draft.connections.iter().enumerate() {
        connections.push(WorkflowConnection {
            id: (i + 1) as i64,
            workflow_id: 0,
            from_node_id: key_to_id
                .get(conn_draft.from.as_str())
                .copied()
                .unwrap_or(-1),
            to_node_id: key_to_id.get(conn_draft.to.as_str()).copied().unwrap_or(-1),
            output_name: conn_draft.output_name.clone(),
            order: conn_draft.order,
            label: conn_draft.label.clone(),
        });
    }
    (nodes, connections, key_to_id)
}
