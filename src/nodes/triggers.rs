//! Entry-point triggers. Each trigger has two halves: a pure
//! `should_trigger` matcher the engine consults when a lifecycle event
//! arrives, and an executor that records the activation once an execution
//! actually starts. Filters combine as logical AND; an absent filter means
//! "no constraint".

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use super::executor::{
    ConfigField, ConfigType, ExecutorEnv, NodeExecutor, NodeRunResult, DEFAULT_OUTPUT,
};
use super::util::{glob_match, parse_config};
use crate::context::{ContextBag, ContextValue};
use crate::error::NodeError;
use crate::model::{Document, IngestSource, LifecycleEvent, NodeKind, ValidationStatus, WorkflowNode};

/// Decide whether an entry node's trigger qualifies for an event.
///
/// Pure and read-mostly: the document snapshot is fetched once by the
/// engine and shared across all candidate workflows.
pub fn should_trigger(
    kind: NodeKind,
    config: &Value,
    document: Option<&Document>,
    event: &LifecycleEvent,
) -> Result<bool, NodeError> {
    match (kind, event) {
        (NodeKind::TriggerDocumentAdded, LifecycleEvent::DocumentAdded { source, .. }) => {
            let filter: DocumentAddedFilter = parse_config(config)?;
            let document = document.ok_or(NodeError::MissingDocument)?;
            Ok(filter.matches(document, *source))
        }
        (NodeKind::TriggerUpload, LifecycleEvent::DocumentAdded { source, .. }) => {
            if *source != IngestSource::Upload {
                return Ok(false);
            }
            let filter: FilenameFilter = parse_config(config)?;
            let document = document.ok_or(NodeError::MissingDocument)?;
            Ok(filter.matches(document))
        }
        (NodeKind::TriggerScan, LifecycleEvent::ConsumptionStarted { .. }) => {
            let filter: FilenameFilter = parse_config(config)?;
            let document = document.ok_or(NodeError::MissingDocument)?;
            Ok(filter.matches(document))
        }
        (
            NodeKind::TriggerTagAdded,
            LifecycleEvent::TagAdded {
                tag_id, tag_name, ..
            },
        ) => {
            let filter: TagAddedFilter = parse_config(config)?;
            Ok(filter.matches(*tag_id, tag_name))
        }
        (
            NodeKind::TriggerValidationChanged,
            LifecycleEvent::ValidationChanged { new_status, .. },
        ) => {
            let filter: ValidationChangedFilter = parse_config(config)?;
            let document = document.ok_or(NodeError::MissingDocument)?;
            Ok(filter.matches(document, *new_status))
        }
        // Manual triggers only fire through an explicit start call, never
        // off the event bus.
        _ => Ok(false),
    }
}

// --- Filter vocabularies ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DocumentAddedFilter {
    pub filter_document_type_ids: Vec<i64>,
    pub filter_document_type_codes: Vec<String>,
    pub filter_correspondent_ids: Vec<i64>,
    pub filter_min_amount: Option<f64>,
    pub filter_max_amount: Option<f64>,
    pub filter_filename_pattern: Option<String>,
    pub filter_tag_ids: Vec<i64>,
    pub filter_source: Option<IngestSource>,
}

impl DocumentAddedFilter {
    pub fn matches(&self, document: &Document, source: IngestSource) -> bool {
        if !self.filter_document_type_ids.is_empty() {
            match document.document_type_id {
                Some(id) if self.filter_document_type_ids.contains(&id) => {}
                _ => return false,
            }
        }
        if !self.filter_document_type_codes.is_empty() {
            match document.document_type_code.as_deref() {
                Some(code) if self.filter_document_type_codes.iter().any(|c| c == code) => {}
                _ => return false,
            }
        }
        if !self.filter_correspondent_ids.is_empty() {
            match document.correspondent_id {
                Some(id) if self.filter_correspondent_ids.contains(&id) => {}
                _ => return false,
            }
        }
        // Amount range is inclusive; documents without an amount count as 0.
        let amount = document.amount.unwrap_or(0.0);
        if let Some(min) = self.filter_min_amount {
            if amount < min {
                return false;
            }
        }
        if let Some(max) = self.filter_max_amount {
            if amount > max {
                return false;
            }
        }
        if let Some(pattern) = &self.filter_filename_pattern {
            let filename = document.original_filename.as_deref().unwrap_or("");
            if !glob_match(pattern, filename) {
                return false;
            }
        }
        // Tag membership: the document must carry at least one listed tag.
        if !self.filter_tag_ids.is_empty()
            && !self.filter_tag_ids.iter().any(|id| document.has_tag_id(*id))
        {
            return false;
        }
        if let Some(expected) = self.filter_source {
            if source != expected {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilenameFilter {
    pub filter_filename_pattern: Option<String>,
}

impl FilenameFilter {
    pub fn matches(&self, document: &Document) -> bool {
        match &self.filter_filename_pattern {
            Some(pattern) => {
                let filename = document.original_filename.as_deref().unwrap_or("");
                glob_match(pattern, filename)
            }
            None => true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TagAddedFilter {
    pub trigger_tag_ids: Vec<i64>,
    pub trigger_tag_names: Vec<String>,
}

impl TagAddedFilter {
    /// No configured filter means any tag addition matches. Name patterns
    /// are case-insensitive and glob-capable.
    pub fn matches(&self, tag_id: i64, tag_name: &str) -> bool {
        if !self.trigger_tag_ids.is_empty() && !self.trigger_tag_ids.contains(&tag_id) {
            return false;
        }
        if !self.trigger_tag_names.is_empty() {
            let matched = self
                .trigger_tag_names
                .iter()
                .any(|pattern| pattern.eq_ignore_ascii_case(tag_name) || glob_match(pattern, tag_name));
            if !matched {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValidationChangedFilter {
    pub filter_status: Vec<ValidationStatus>,
    pub on_approved: bool,
    pub on_rejected: bool,
    pub filter_document_type_ids: Vec<i64>,
    pub filter_document_type_codes: Vec<String>,
    pub filter_correspondent_ids: Vec<i64>,
    pub filter_min_amount: Option<f64>,
    pub filter_max_amount: Option<f64>,
    pub filter_validation_level: Option<i32>,
}

impl ValidationChangedFilter {
    pub fn matches(&self, document: &Document, new_status: ValidationStatus) -> bool {
        if !self.filter_status.is_empty() && !self.filter_status.contains(&new_status) {
            return false;
        }
        if self.on_approved && new_status != ValidationStatus::Approved {
            return false;
        }
        if self.on_rejected && new_status != ValidationStatus::Rejected {
            return false;
        }
        if !self.filter_document_type_ids.is_empty() {
            match document.document_type_id {
                Some(id) if self.filter_document_type_ids.contains(&id) => {}
                _ => return false,
            }
        }
        if !self.filter_document_type_codes.is_empty() {
            match document.document_type_code.as_deref() {
                Some(code) if self.filter_document_type_codes.iter().any(|c| c == code) => {}
                _ => return false,
            }
        }
        if !self.filter_correspondent_ids.is_empty() {
            match document.correspondent_id {
                Some(id) if self.filter_correspondent_ids.contains(&id) => {}
                _ => return false,
            }
        }
        let amount = document.amount.unwrap_or(0.0);
        if let Some(min) = self.filter_min_amount {
            if amount < min {
                return false;
            }
        }
        if let Some(max) = self.filter_max_amount {
            if amount > max {
                return false;
            }
        }
        if let Some(level) = self.filter_validation_level {
            if document.validation_level != level {
                return false;
            }
        }
        true
    }
}

// --- Executors ---
// A trigger executor always succeeds: the filtering already happened in
// `should_trigger` before the execution was created.

pub struct DocumentAddedTrigger;

#[async_trait]
impl NodeExecutor for DocumentAddedTrigger {
    async fn execute(
        &self,
        _node: &WorkflowNode,
        ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let mut data = HashMap::new();
        data.insert("trigger_type".into(), ContextValue::from("document_added"));
        if let Some(id) = env.document_id {
            data.insert("document_id".into(), ContextValue::Integer(id));
        }
        if let Some(source) = ctx.get("source") {
            data.insert("source".into(), source.clone());
        }
        Ok(NodeRunResult::success(data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "filter_document_type_ids",
                ConfigType::Array,
                false,
                "Match only these document type ids",
            ),
            ConfigField::new(
                "filter_document_type_codes",
                ConfigType::Array,
                false,
                "Match only these document type codes (e.g. FACTURE, CONTRAT)",
            ),
            ConfigField::new(
                "filter_correspondent_ids",
                ConfigType::Array,
                false,
                "Match only these correspondent ids",
            ),
            ConfigField::new(
                "filter_min_amount",
                ConfigType::Number,
                false,
                "Minimum amount, inclusive",
            ),
            ConfigField::new(
                "filter_max_amount",
                ConfigType::Number,
                false,
                "Maximum amount, inclusive",
            ),
            ConfigField::new(
                "filter_filename_pattern",
                ConfigType::String,
                false,
                "Filename glob (* and ?)",
            ),
            ConfigField::new(
                "filter_tag_ids",
                ConfigType::Array,
                false,
                "Document must carry at least one of these tags",
            ),
            ConfigField::new(
                "filter_source",
                ConfigType::String,
                false,
                "Ingestion source: consume, upload or api",
            ),
        ]
    }
}

pub struct TagAddedTrigger;

#[async_trait]
impl NodeExecutor for TagAddedTrigger {
    async fn execute(
        &self,
        _node: &WorkflowNode,
        ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let mut data = HashMap::new();
        data.insert("trigger_type".into(), ContextValue::from("tag_added"));
        if let Some(id) = env.document_id {
            data.insert("document_id".into(), ContextValue::Integer(id));
        }
        if let Some(tag_id) = ctx.get("tag_id") {
            data.insert("tag_id".into(), tag_id.clone());
        }
        if let Some(tag_name) = ctx.get("tag_name") {
            data.insert("tag_name".into(), tag_name.clone());
        }
        Ok(NodeRunResult::success(data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "trigger_tag_ids",
                ConfigType::Array,
                false,
                "Fire only for these tag ids",
            ),
            ConfigField::new(
                "trigger_tag_names",
                ConfigType::Array,
                false,
                "Fire only for these tag names (glob-capable, case-insensitive)",
            ),
        ]
    }
}

pub struct ValidationChangedTrigger;

#[async_trait]
impl NodeExecutor for ValidationChangedTrigger {
    async fn execute(
        &self,
        _node: &WorkflowNode,
        ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let mut data = HashMap::new();
        data.insert(
            "trigger_type".into(),
            ContextValue::from("validation_changed"),
        );
        if let Some(id) = env.document_id {
            data.insert("document_id".into(), ContextValue::Integer(id));
        }
        // Branch per resulting status so downstream nodes can react
        // differently to approvals and rejections.
        let output = match ctx.get("validation_new_status").and_then(ContextValue::as_str) {
            Some("approved") => "approved",
            Some("rejected") => "rejected",
            _ => DEFAULT_OUTPUT,
        };
        Ok(NodeRunResult::success_with(output, data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "filter_status",
                ConfigType::Array,
                false,
                "Resulting statuses that fire the trigger",
            ),
            ConfigField::new(
                "on_approved",
                ConfigType::Boolean,
                false,
                "Fire only when the document was approved",
            ),
            ConfigField::new(
                "on_rejected",
                ConfigType::Boolean,
                false,
                "Fire only when the document was rejected",
            ),
            ConfigField::new(
                "filter_document_type_ids",
                ConfigType::Array,
                false,
                "Match only these document type ids",
            ),
            ConfigField::new(
                "filter_document_type_codes",
                ConfigType::Array,
                false,
                "Match only these document type codes",
            ),
            ConfigField::new(
                "filter_correspondent_ids",
                ConfigType::Array,
                false,
                "Match only these correspondent ids",
            ),
            ConfigField::new(
                "filter_min_amount",
                ConfigType::Number,
                false,
                "Minimum amount, inclusive",
            ),
            ConfigField::new(
                "filter_max_amount",
                ConfigType::Number,
                false,
                "Maximum amount, inclusive",
            ),
            ConfigField::new(
                "filter_validation_level",
                ConfigType::Integer,
                false,
                "Exact validation level",
            ),
        ]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["approved", "rejected", DEFAULT_OUTPUT]
    }
}

/// Shared by the scan, upload and manual triggers: record the activation
/// and move on.
pub struct ActivationTrigger {
    trigger_type: &'static str,
}

impl ActivationTrigger {
    pub fn scan() -> Self {
        Self {
            trigger_type: "scan",
        }
    }

    pub fn upload() -> Self {
        Self {
            trigger_type: "upload",
        }
    }

    pub fn manual() -> Self {
        Self {
            trigger_type: "manual",
        }
    }
}

#[async_trait]
impl NodeExecutor for ActivationTrigger {
    async fn execute(
        &self,
        _node: &WorkflowNode,
        _ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let mut data = HashMap::new();
        data.insert("trigger_type".into(), ContextValue::from(self.trigger_type));
        if let Some(id) = env.document_id {
            data.insert("document_id".into(), ContextValue::Integer(id));
        }
        Ok(NodeRunResult::success(data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![ConfigField::new(
            "filter_filename_pattern",
            ConfigType::String,
            false,
            "Filename glob (* and ?)",
        )]
    }
}
