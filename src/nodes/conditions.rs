//! Condition nodes: read the subject document, branch on `true`/`false`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use super::executor::{ConfigField, ConfigType, ExecutorEnv, NodeExecutor, NodeRunResult};
use super::util::{glob_match, parse_config};
use crate::context::{ContextBag, ContextValue};
use crate::error::NodeError;
use crate::model::WorkflowNode;

const BRANCH_OUTPUTS: &[&str] = &["true", "false"];

fn branch(matches: bool, data: HashMap<String, ContextValue>) -> NodeRunResult {
    NodeRunResult::success_with(if matches { "true" } else { "false" }, data)
}

// --- Amount ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AmountConditionConfig {
    operator: Option<String>,
    value: Option<f64>,
    value2: Option<f64>,
}

pub struct AmountCondition;

#[async_trait]
impl NodeExecutor for AmountCondition {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: AmountConditionConfig = parse_config(&node.config)?;
        let document = env.document().await?;
        let operator = cfg.operator.as_deref().unwrap_or("==");

        let matches = match document.amount {
            None => operator == "is_null",
            Some(amount) => {
                let value = cfg.value.unwrap_or(0.0);
                match operator {
                    "==" | "equals" => amount == value,
                    "!=" | "not_equals" => amount != value,
                    ">" | "greater_than" => amount > value,
                    "<" | "less_than" => amount < value,
                    ">=" | "greater_or_equal" => amount >= value,
                    "<=" | "less_or_equal" => amount <= value,
                    "between" => match (cfg.value, cfg.value2) {
                        (Some(a), Some(b)) => {
                            let (min, max) = if a <= b { (a, b) } else { (b, a) };
                            amount >= min && amount <= max
                        }
                        _ => false,
                    },
                    "is_null" => false,
                    "is_not_null" => true,
                    other => {
                        return Err(NodeError::ConfigError(format!(
                            "unknown amount operator: {other}"
                        )))
                    }
                }
            }
        };

        let mut data = HashMap::new();
        data.insert("matches".into(), ContextValue::Boolean(matches));
        if let Some(amount) = document.amount {
            data.insert("document_amount".into(), ContextValue::Float(amount));
        }
        Ok(branch(matches, data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "operator",
                ConfigType::String,
                false,
                "Comparison: == (default), !=, >, <, >=, <=, between, is_null, is_not_null",
            ),
            ConfigField::new(
                "value",
                ConfigType::Number,
                false,
                "Comparison value (required except for is_null/is_not_null)",
            ),
            ConfigField::new(
                "value2",
                ConfigType::Number,
                false,
                "Upper bound for the between operator",
            ),
        ]
    }

    fn outputs(&self) -> &'static [&'static str] {
        BRANCH_OUTPUTS
    }
}

// --- Tags ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TagConditionConfig {
    match_mode: Option<String>,
    tag_ids: Vec<i64>,
    tag_names: Vec<String>,
}

pub struct TagCondition;

#[async_trait]
impl NodeExecutor for TagCondition {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: TagConditionConfig = parse_config(&node.config)?;
        let document = env.document().await?;

        let wanted_by_id = |id: &i64| document.has_tag_id(*id);
        let wanted_by_name =
            |name: &String| document.tag_names().any(|t| t.eq_ignore_ascii_case(name));

        let id_hits = cfg.tag_ids.iter().filter(|id| wanted_by_id(id)).count();
        let name_hits = cfg
            .tag_names
            .iter()
            .filter(|name| wanted_by_name(name))
            .count();
        let total_wanted = cfg.tag_ids.len() + cfg.tag_names.len();
        let total_hits = id_hits + name_hits;

        let mode = cfg.match_mode.as_deref().unwrap_or("any");
        let matches = match mode {
            "any" => total_wanted == 0 || total_hits > 0,
            "all" => total_hits == total_wanted,
            "none" => total_hits == 0,
            other => {
                return Err(NodeError::ConfigError(format!(
                    "unknown tag match mode: {other}"
                )))
            }
        };

        let mut data = HashMap::new();
        data.insert("matches".into(), ContextValue::Boolean(matches));
        Ok(branch(matches, data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "match_mode",
                ConfigType::String,
                false,
                "any (default), all or none",
            ),
            ConfigField::new("tag_ids", ConfigType::Array, false, "Tag ids to test"),
            ConfigField::new(
                "tag_names",
                ConfigType::Array,
                false,
                "Tag names to test (case-insensitive)",
            ),
        ]
    }

    fn outputs(&self) -> &'static [&'static str] {
        BRANCH_OUTPUTS
    }
}

// --- Correspondent ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CorrespondentConditionConfig {
    correspondent_ids: Vec<i64>,
}

pub struct CorrespondentCondition;

#[async_trait]
impl NodeExecutor for CorrespondentCondition {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: CorrespondentConditionConfig = parse_config(&node.config)?;
        let document = env.document().await?;
        let matches = match document.correspondent_id {
            Some(id) => cfg.correspondent_ids.contains(&id),
            None => false,
        };
        let mut data = HashMap::new();
        data.insert("matches".into(), ContextValue::Boolean(matches));
        Ok(branch(matches, data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![ConfigField::new(
            "correspondent_ids",
            ConfigType::Array,
            true,
            "Correspondent ids that pass the condition",
        )]
    }

    fn outputs(&self) -> &'static [&'static str] {
        BRANCH_OUTPUTS
    }
}

// --- Document type ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DocumentTypeConditionConfig {
    document_type_ids: Vec<i64>,
    document_type_codes: Vec<String>,
}

pub struct DocumentTypeCondition;

#[async_trait]
impl NodeExecutor for DocumentTypeCondition {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: DocumentTypeConditionConfig = parse_config(&node.config)?;
        let document = env.document().await?;

        let by_id = document
            .document_type_id
            .map(|id| cfg.document_type_ids.contains(&id))
            .unwrap_or(false);
        let by_code = document
            .document_type_code
            .as_deref()
            .map(|code| cfg.document_type_codes.iter().any(|c| c == code))
            .unwrap_or(false);
        let matches = by_id || by_code;

        let mut data = HashMap::new();
        data.insert("matches".into(), ContextValue::Boolean(matches));
        Ok(branch(matches, data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "document_type_ids",
                ConfigType::Array,
                false,
                "Document type ids that pass",
            ),
            ConfigField::new(
                "document_type_codes",
                ConfigType::Array,
                false,
                "Document type codes that pass",
            ),
        ]
    }

    fn outputs(&self) -> &'static [&'static str] {
        BRANCH_OUTPUTS
    }
}

// --- Field ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FieldConditionConfig {
    field: String,
    operator: Option<String>,
    value: Option<Value>,
}

pub struct FieldCondition;

#[async_trait]
impl NodeExecutor for FieldCondition {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: FieldConditionConfig = parse_config(&node.config)?;
        if cfg.field.is_empty() {
            return Err(NodeError::ConfigError("field is required".into()));
        }
        let document = env.document().await?;
        let actual = document.field(&cfg.field);
        let expected = cfg.value.as_ref().map(value_display);
        let operator = cfg.operator.as_deref().unwrap_or("equals");

        let matches = match operator {
            "equals" | "==" => match (&actual, &expected) {
                (Some(a), Some(e)) => a.eq_ignore_ascii_case(e),
                _ => false,
            },
            "not_equals" | "!=" => match (&actual, &expected) {
                (Some(a), Some(e)) => !a.eq_ignore_ascii_case(e),
                (None, Some(_)) => true,
                _ => false,
            },
            "contains" => match (&actual, &expected) {
                (Some(a), Some(e)) => a.to_lowercase().contains(&e.to_lowercase()),
                _ => false,
            },
            "starts_with" => match (&actual, &expected) {
                (Some(a), Some(e)) => a.to_lowercase().starts_with(&e.to_lowercase()),
                _ => false,
            },
            "ends_with" => match (&actual, &expected) {
                (Some(a), Some(e)) => a.to_lowercase().ends_with(&e.to_lowercase()),
                _ => false,
            },
            "matches" => match (&actual, &expected) {
                (Some(a), Some(e)) => glob_match(e, a),
                _ => false,
            },
            "is_empty" => actual.as_deref().map(str::is_empty).unwrap_or(true),
            "is_not_empty" => actual.as_deref().map(|s| !s.is_empty()).unwrap_or(false),
            other => {
                return Err(NodeError::ConfigError(format!(
                    "unknown field operator: {other}"
                )))
            }
        };

        let mut data = HashMap::new();
        data.insert("matches".into(), ContextValue::Boolean(matches));
        if let Some(actual) = actual {
            data.insert("field_value".into(), ContextValue::String(actual));
        }
        Ok(branch(matches, data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "field",
                ConfigType::String,
                true,
                "Standard or custom document field name",
            ),
            ConfigField::new(
                "operator",
                ConfigType::String,
                false,
                "equals (default), not_equals, contains, starts_with, ends_with, matches, is_empty, is_not_empty",
            ),
            ConfigField::new("value", ConfigType::String, false, "Comparison value"),
        ]
    }

    fn outputs(&self) -> &'static [&'static str] {
        BRANCH_OUTPUTS
    }
}

fn value_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
