//! The context bag: a type-tagged key/value store accumulated across node
//! executions, plus per-node output maps and `{placeholder}` interpolation
//! for email and webhook templates.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::model::Document;

/// A single typed value in the context bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Structured payloads (arrays, objects) kept as raw JSON.
    Json(Value),
}

impl ContextValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ContextValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ContextValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ContextValue::Float(v) => Some(*v),
            ContextValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ContextValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Render for interpolation into a template.
    pub fn to_display(&self) -> String {
        match self {
            ContextValue::Null => String::new(),
            ContextValue::Boolean(v) => v.to_string(),
            ContextValue::Integer(v) => v.to_string(),
            ContextValue::Float(v) => v.to_string(),
            ContextValue::String(s) => s.clone(),
            ContextValue::Json(v) => v.to_string(),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ContextValue::Null,
            Value::Bool(b) => ContextValue::Boolean(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ContextValue::Integer(i)
                } else {
                    ContextValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => ContextValue::String(s.clone()),
            other => ContextValue::Json(other.clone()),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::String(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::String(s)
    }
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        ContextValue::Integer(v)
    }
}

impl From<f64> for ContextValue {
    fn from(v: f64) -> Self {
        ContextValue::Float(v)
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        ContextValue::Boolean(v)
    }
}

/// Mutable data shared between the nodes of one execution.
///
/// Exclusively owned and mutated by the engine while stepping; serialized
/// as part of the execution row so suspended workflows survive restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBag {
    #[serde(default)]
    data: HashMap<String, ContextValue>,
    #[serde(default)]
    node_outputs: HashMap<i64, HashMap<String, ContextValue>>,
    #[serde(default)]
    node_names: HashMap<String, i64>,
}

impl ContextBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
        self.data.remove(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn merge(&mut self, values: HashMap<String, ContextValue>) {
        self.data.extend(values);
    }

    pub fn data(&self) -> &HashMap<String, ContextValue> {
        &self.data
    }

    pub fn set_node_output(
        &mut self,
        node_id: i64,
        key: impl Into<String>,
        value: impl Into<ContextValue>,
    ) {
        self.node_outputs
            .entry(node_id)
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn node_output(&self, node_id: i64, key: &str) -> Option<&ContextValue> {
        self.node_outputs.get(&node_id).and_then(|m| m.get(key))
    }

    pub fn node_outputs(&self, node_id: i64) -> Option<&HashMap<String, ContextValue>> {
        self.node_outputs.get(&node_id)
    }

    /// Record a node's display name so templates can reference its outputs
    /// as `{name.key}` instead of `{id.key}`.
    pub fn register_node_name(&mut self, node_id: i64, name: impl Into<String>) {
        self.node_names.insert(name.into(), node_id);
    }

    pub fn node_id_by_name(&self, name: &str) -> Option<i64> {
        self.node_names.get(name).copied()
    }

    /// Replace `{key}`, `{node.key}` and `{document.field}` placeholders.
    /// Unresolved placeholders are left verbatim.
    pub fn interpolate(&self, template: &str, document: Option<&Document>) -> String {
        static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
        let re = PLACEHOLDER.get_or_init(|| Regex::new(r"\{([^}{]+)\}").expect("static regex"));

        re.replace_all(template, |caps: &regex::Captures<'_>| {
            let placeholder = &caps[1];
            self.resolve_placeholder(placeholder, document)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
    }

    fn resolve_placeholder(&self, placeholder: &str, document: Option<&Document>) -> Option<String> {
        if let Some((source, key)) = placeholder.split_once('.') {
            if source == "document" {
                return document.and_then(|d| d.field(key));
            }
            if source == "context" {
                return self.get(key).map(ContextValue::to_display);
            }
            // Node reference by numeric id, then by registered name.
            if let Ok(node_id) = source.parse::<i64>() {
                if let Some(v) = self.node_output(node_id, key) {
                    return Some(v.to_display());
                }
            }
            if let Some(node_id) = self.node_id_by_name(source) {
                if let Some(v) = self.node_output(node_id, key) {
                    return Some(v.to_display());
                }
            }
            return None;
        }

        if let Some(v) = self.get(placeholder) {
            return Some(v.to_display());
        }
        document.and_then(|d| d.field(placeholder))
    }
}
