use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::context::ContextValue;

/// How a document entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestSource {
    Consume,
    Upload,
    Api,
}

/// Validation state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected,
    Na,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Approved => "approved",
            ValidationStatus::Rejected => "rejected",
            ValidationStatus::Na => "na",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<super::Decision> for ValidationStatus {
    fn from(decision: super::Decision) -> Self {
        match decision {
            super::Decision::Approved => ValidationStatus::Approved,
            super::Decision::Rejected => ValidationStatus::Rejected,
        }
    }
}

/// A tag attached to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub id: i64,
    pub name: String,
}

/// Snapshot of the subject document as seen by trigger matchers,
/// conditions and actions. The document lifecycle itself (ingestion, OCR,
/// storage) is an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub document_type_id: Option<i64>,
    #[serde(default)]
    pub document_type_code: Option<String>,
    #[serde(default)]
    pub correspondent_id: Option<i64>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub doc_date: Option<NaiveDate>,
    #[serde(default)]
    pub tags: Vec<TagRef>,
    pub source: IngestSource,
    pub validation_status: ValidationStatus,
    #[serde(default = "default_validation_level")]
    pub validation_level: i32,
    #[serde(default)]
    pub validated_by: Option<i64>,
    #[serde(default)]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validation_comment: Option<String>,
    #[serde(default)]
    pub assigned_user_id: Option<i64>,
    #[serde(default)]
    pub assigned_group_id: Option<i64>,
    #[serde(default)]
    pub custom_fields: HashMap<String, ContextValue>,
}

fn default_validation_level() -> i32 {
    1
}

impl Document {
    pub fn has_tag_id(&self, tag_id: i64) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.name.as_str())
    }

    /// Resolve a standard or custom field to its display form, for
    /// `{document.field}` interpolation and field conditions.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.to_string()),
            "title" => Some(self.title.clone()),
            "original_filename" => self.original_filename.clone(),
            "document_type_code" => self.document_type_code.clone(),
            "document_type_id" => self.document_type_id.map(|v| v.to_string()),
            "correspondent_id" => self.correspondent_id.map(|v| v.to_string()),
            "amount" => self.amount.map(|v| format!("{v:.2}")),
            "currency" => self.currency.clone(),
            "doc_date" => self.doc_date.map(|d| d.to_string()),
            "validation_status" => Some(self.validation_status.to_string()),
            "validation_level" => Some(self.validation_level.to_string()),
            _ => self.custom_fields.get(name).map(|v| v.to_display()),
        }
    }
}

/// Append-only entry in a document's validation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationEvent {
    pub document_id: i64,
    pub from_status: Option<ValidationStatus>,
    pub to_status: ValidationStatus,
    pub performed_by: Option<i64>,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}
