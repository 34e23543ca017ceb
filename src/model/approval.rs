use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A recorded approval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    /// The output name an approval node emits for this decision.
    pub fn as_output(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_output())
    }
}

/// Single-use, time-limited credential tied to a suspended execution.
///
/// `responded_at` marks the token consumed; a consumed token can never be
/// consumed again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalToken {
    pub id: i64,
    /// Random, unguessable value carried in the emailed link.
    pub token: String,
    pub execution_id: i64,
    pub node_id: i64,
    pub document_id: Option<i64>,
    pub assigned_user_id: Option<i64>,
    pub assigned_group_id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub response_action: Option<Decision>,
    pub response_comment: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalToken {
    pub fn is_responded(&self) -> bool {
        self.responded_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Append-only audit row for every approval decision, independent of the
/// mutable execution row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: i64,
    pub execution_id: i64,
    pub node_id: i64,
    pub token_id: i64,
    pub document_id: Option<i64>,
    pub decision: Decision,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}
