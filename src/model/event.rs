use serde::{Deserialize, Serialize};

use super::{IngestSource, ValidationStatus};
use crate::context::{ContextBag, ContextValue};

/// A document lifecycle event handed to the engine. Each enabled
/// workflow's entry triggers are asked whether the event qualifies; every
/// match starts an independent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    DocumentAdded {
        document_id: i64,
        source: IngestSource,
    },
    TagAdded {
        document_id: i64,
        tag_id: i64,
        tag_name: String,
    },
    ValidationChanged {
        document_id: i64,
        new_status: ValidationStatus,
        previous_status: Option<ValidationStatus>,
    },
    /// A file was detected by the external consume-folder watcher.
    ConsumptionStarted { document_id: i64 },
}

impl LifecycleEvent {
    pub fn document_id(&self) -> i64 {
        match self {
            LifecycleEvent::DocumentAdded { document_id, .. }
            | LifecycleEvent::TagAdded { document_id, .. }
            | LifecycleEvent::ValidationChanged { document_id, .. }
            | LifecycleEvent::ConsumptionStarted { document_id } => *document_id,
        }
    }

    /// Seed a fresh execution's context with the event payload so trigger
    /// executors and downstream nodes can read it.
    pub fn seed_context(&self, ctx: &mut ContextBag) {
        match self {
            LifecycleEvent::DocumentAdded { source, .. } => {
                ctx.set("source", ContextValue::from(source_str(*source)));
            }
            LifecycleEvent::TagAdded {
                tag_id, tag_name, ..
            } => {
                ctx.set("tag_id", ContextValue::Integer(*tag_id));
                ctx.set("tag_name", ContextValue::from(tag_name.as_str()));
            }
            LifecycleEvent::ValidationChanged {
                new_status,
                previous_status,
                ..
            } => {
                ctx.set(
                    "validation_new_status",
                    ContextValue::from(new_status.as_str()),
                );
                if let Some(prev) = previous_status {
                    ctx.set(
                        "validation_previous_status",
                        ContextValue::from(prev.as_str()),
                    );
                }
            }
            LifecycleEvent::ConsumptionStarted { .. } => {
                ctx.set("source", ContextValue::from("consume"));
            }
        }
    }
}

fn source_str(source: IngestSource) -> &'static str {
    match source {
        IngestSource::Consume => "consume",
        IngestSource::Upload => "upload",
        IngestSource::Api => "api",
    }
}
