use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{ContextBag, ContextValue};
use crate::engine::EngineConfig;
use crate::error::NodeError;
use crate::model::{Document, WorkflowNode};
use crate::runtime::RuntimeContext;
use crate::services::{Mailer, WebhookTransport};
use crate::store::WorkflowStore;

/// Output name followed when an executor does not pick a branch.
pub const DEFAULT_OUTPUT: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRunStatus {
    Succeeded,
    Failed,
    Waiting,
}

/// A suspension request carried by a waiting result.
#[derive(Debug, Clone, Default)]
pub struct WaitRequest {
    /// Opaque identifier the resume call must reference (a token value,
    /// `"timer"`, ...).
    pub waiting_for: Option<String>,
    /// Deadline, as seconds from now; the expiry sweep picks it up.
    pub wait_seconds: Option<i64>,
}

/// What one node execution produced: a branch selection, data merged into
/// the execution context, and optionally a suspension request.
#[derive(Debug, Clone)]
pub struct NodeRunResult {
    pub status: NodeRunStatus,
    pub output: String,
    pub data: HashMap<String, ContextValue>,
    pub error: Option<String>,
    pub wait: Option<WaitRequest>,
}

impl Default for NodeRunResult {
    fn default() -> Self {
        NodeRunResult {
            status: NodeRunStatus::Succeeded,
            output: DEFAULT_OUTPUT.to_string(),
            data: HashMap::new(),
            error: None,
            wait: None,
        }
    }
}

impl NodeRunResult {
    pub fn success(data: HashMap<String, ContextValue>) -> Self {
        NodeRunResult {
            data,
            ..Default::default()
        }
    }

    pub fn success_with(output: impl Into<String>, data: HashMap<String, ContextValue>) -> Self {
        NodeRunResult {
            output: output.into(),
            data,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        NodeRunResult {
            status: NodeRunStatus::Failed,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn waiting(
        waiting_for: Option<String>,
        wait_seconds: Option<i64>,
        data: HashMap<String, ContextValue>,
    ) -> Self {
        NodeRunResult {
            status: NodeRunStatus::Waiting,
            data,
            wait: Some(WaitRequest {
                waiting_for,
                wait_seconds,
            }),
            ..Default::default()
        }
    }
}

/// Declared type of a configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

/// One entry of a node kind's published configuration schema, consumed by
/// the designer to render forms and by the engine to validate before
/// execution.
#[derive(Debug, Clone)]
pub struct ConfigField {
    pub key: &'static str,
    pub field_type: ConfigType,
    pub required: bool,
    pub description: &'static str,
}

impl ConfigField {
    pub const fn new(
        key: &'static str,
        field_type: ConfigType,
        required: bool,
        description: &'static str,
    ) -> Self {
        ConfigField {
            key,
            field_type,
            required,
            description,
        }
    }
}

/// Check a raw config object against a published schema. Missing required
/// keys and type mismatches are configuration errors; unknown keys pass
/// through untouched.
pub fn validate_config(schema: &[ConfigField], config: &Value) -> Result<(), NodeError> {
    let map = match config {
        Value::Null => {
            if let Some(field) = schema.iter().find(|f| f.required) {
                return Err(NodeError::ConfigError(format!(
                    "missing required config key: {}",
                    field.key
                )));
            }
            return Ok(());
        }
        Value::Object(map) => map,
        other => {
            return Err(NodeError::ConfigError(format!(
                "config must be an object, got {other}"
            )))
        }
    };

    for field in schema {
        match map.get(field.key) {
            None | Some(Value::Null) => {
                if field.required {
                    return Err(NodeError::ConfigError(format!(
                        "missing required config key: {}",
                        field.key
                    )));
                }
            }
            Some(value) => {
                let ok = match field.field_type {
                    ConfigType::String => value.is_string(),
                    ConfigType::Integer => value.is_i64() || value.is_u64(),
                    ConfigType::Number => value.is_number(),
                    ConfigType::Boolean => value.is_boolean(),
                    ConfigType::Array => value.is_array(),
                    ConfigType::Object => value.is_object(),
                };
                if !ok {
                    return Err(NodeError::ConfigError(format!(
                        "config key {} has wrong type (expected {:?})",
                        field.key, field.field_type
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Services available to an executor while it runs, scoped to one
/// execution.
#[derive(Clone)]
pub struct ExecutorEnv {
    pub store: Arc<dyn WorkflowStore>,
    pub runtime: RuntimeContext,
    pub mailer: Arc<dyn Mailer>,
    pub webhooks: Arc<dyn WebhookTransport>,
    pub config: EngineConfig,
    pub execution_id: i64,
    pub workflow_id: i64,
    pub document_id: Option<i64>,
}

impl ExecutorEnv {
    /// The subject document, or the node errors that make its absence
    /// precise.
    pub async fn document(&self) -> Result<Document, NodeError> {
        let id = self.document_id.ok_or(NodeError::MissingDocument)?;
        self.store
            .document(id)
            .await?
            .ok_or(NodeError::DocumentNotFound(id))
    }
}

/// Trait implemented by every node kind. Side effects performed inside
/// `execute` must tolerate at-least-once replay: a crash between the side
/// effect and persistence re-invokes the same node.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError>;

    /// Accepted configuration keys, for designer forms and pre-execution
    /// validation.
    fn config_schema(&self) -> Vec<ConfigField> {
        Vec::new()
    }

    /// Output names this node can emit.
    fn outputs(&self) -> &'static [&'static str] {
        &[DEFAULT_OUTPUT]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: &[ConfigField] = &[
        ConfigField::new("status", ConfigType::String, true, "target status"),
        ConfigField::new("validation_level", ConfigType::Integer, false, "level"),
    ];

    #[test]
    fn test_validate_config_required_key() {
        let err = validate_config(SCHEMA, &json!({})).unwrap_err();
        assert!(err.to_string().contains("status"));
        assert!(validate_config(SCHEMA, &json!({"status": "approved"})).is_ok());
    }

    #[test]
    fn test_validate_config_type_mismatch() {
        let err =
            validate_config(SCHEMA, &json!({"status": "x", "validation_level": "two"}))
                .unwrap_err();
        assert!(err.to_string().contains("validation_level"));
    }

    #[test]
    fn test_validate_config_null_without_required() {
        let optional = [ConfigField::new("url", ConfigType::String, false, "target")];
        assert!(validate_config(&optional, &Value::Null).is_ok());
        assert!(validate_config(SCHEMA, &Value::Null).is_err());
    }
}
