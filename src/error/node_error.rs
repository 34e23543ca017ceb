use thiserror::Error;

use crate::store::StoreError;

/// Node-level errors. A node error fails the owning execution but never
/// touches sibling executions.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Execution has no document attached")]
    MissingDocument,
    #[error("Document not found: {0}")]
    DocumentNotFound(i64),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Mail error: {0}")]
    MailError(String),
    #[error("HTTP error: {0}")]
    HttpError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::SerializationError(e.to_string())
    }
}
