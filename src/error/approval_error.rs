use chrono::{DateTime, Utc};
use thiserror::Error;

use super::EngineError;
use crate::model::Decision;
use crate::store::StoreError;

/// Approval-resolution errors. All of these are terminal and user-facing;
/// none of them mutates execution state.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Invalid approval token")]
    InvalidToken,
    #[error("Already processed: {decision} at {responded_at}")]
    AlreadyProcessed {
        decision: Decision,
        responded_at: DateTime<Utc>,
        comment: Option<String>,
    },
    #[error("Approval link expired at {expires_at}")]
    Expired { expires_at: DateTime<Utc> },
    #[error("Unknown approval action: {0}")]
    InvalidAction(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}
