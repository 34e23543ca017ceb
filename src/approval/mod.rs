//! Approval resolution: the engine-facing contract behind the emailed
//! decision links. Rendering (confirmation page, result pages) is an
//! external collaborator; security is the unguessable single-use token.

use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::engine::ExecutionEngine;
use crate::error::{ApprovalError, EngineError};
use crate::model::{ApprovalToken, Decision, DecisionRecord, ExecutionStatus};
use crate::runtime::RuntimeContext;
use crate::store::{TokenConsumption, ValidationChange, WorkflowStore};

/// Requested decision, as carried by the link (`?action=approve|reject`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionAction {
    Approve,
    Reject,
}

impl DecisionAction {
    pub fn decision(&self) -> Decision {
        match self {
            DecisionAction::Approve => Decision::Approved,
            DecisionAction::Reject => Decision::Rejected,
        }
    }
}

impl FromStr for DecisionAction {
    type Err = ApprovalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(DecisionAction::Approve),
            "reject" => Ok(DecisionAction::Reject),
            other => Err(ApprovalError::InvalidAction(other.to_string())),
        }
    }
}

/// Successful resolution outcome.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub decision: Decision,
    pub execution_id: i64,
    pub document_id: Option<i64>,
    pub execution_status: ExecutionStatus,
}

pub struct ApprovalService {
    store: Arc<dyn WorkflowStore>,
    engine: Arc<ExecutionEngine>,
    runtime: RuntimeContext,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        engine: Arc<ExecutionEngine>,
        runtime: RuntimeContext,
    ) -> Self {
        ApprovalService {
            store,
            engine,
            runtime,
        }
    }

    /// Read-only token lookup for the confirmation page: surfaces the same
    /// taxonomy as [`resolve`](Self::resolve) without mutating anything.
    pub async fn inspect(&self, token_value: &str) -> Result<ApprovalToken, ApprovalError> {
        let token = self
            .store
            .token_by_value(token_value)
            .await?
            .ok_or(ApprovalError::InvalidToken)?;
        if let Some(responded_at) = token.responded_at {
            return Err(ApprovalError::AlreadyProcessed {
                decision: token.response_action.unwrap_or(Decision::Rejected),
                responded_at,
                comment: token.response_comment,
            });
        }
        if token.is_expired(self.runtime.time.now()) {
            return Err(ApprovalError::Expired {
                expires_at: token.expires_at,
            });
        }
        Ok(token)
    }

    /// Resolve an approval link: consume the token (single use, atomic),
    /// append the decision to the audit history, update the document's
    /// validation status and resume the suspended execution.
    ///
    /// A repeated or concurrent call observes `AlreadyProcessed` carrying
    /// the original decision and mutates nothing.
    pub async fn resolve(
        &self,
        token_value: &str,
        action: DecisionAction,
        comment: Option<String>,
    ) -> Result<Resolution, ApprovalError> {
        let token = self
            .store
            .token_by_value(token_value)
            .await?
            .ok_or(ApprovalError::InvalidToken)?;
        let decision = action.decision();
        let now = self.runtime.time.now();

        // The consumption is the concurrency guard: exactly one caller
        // gets `Consumed`, everyone else sees the recorded decision.
        let token = match self
            .store
            .consume_token(token.id, decision, comment.clone(), now)
            .await?
        {
            TokenConsumption::AlreadyResponded(token) => {
                return Err(ApprovalError::AlreadyProcessed {
                    decision: token.response_action.unwrap_or(decision),
                    responded_at: token.responded_at.unwrap_or(now),
                    comment: token.response_comment,
                });
            }
            TokenConsumption::Expired(token) => {
                return Err(ApprovalError::Expired {
                    expires_at: token.expires_at,
                });
            }
            TokenConsumption::Consumed(token) => token,
        };

        let mut record = DecisionRecord {
            id: 0,
            execution_id: token.execution_id,
            node_id: token.node_id,
            token_id: token.id,
            document_id: token.document_id,
            decision,
            comment: comment.clone(),
            decided_at: now,
        };
        self.store.append_decision(&mut record).await?;

        if let Some(document_id) = token.document_id {
            self.store
                .set_document_validation(
                    document_id,
                    ValidationChange {
                        status: decision.into(),
                        level: 1,
                        validated_by: token.assigned_user_id,
                        comment: comment.clone(),
                        at: now,
                    },
                )
                .await?;
        }

        // If the execution is not suspended (it has not reached the wait
        // node yet, or was cancelled), the decision stays recorded on the
        // token and the wait node picks it up on entry.
        let execution_status = match self
            .engine
            .resume(token.execution_id, decision.as_output(), comment.as_deref())
            .await
        {
            Ok(status) => status,
            Err(EngineError::NotWaiting { status, .. }) => status,
            Err(e) => return Err(e.into()),
        };

        info!(
            execution = token.execution_id,
            token = token.id,
            decision = %decision,
            "approval resolved"
        );
        Ok(Resolution {
            decision,
            execution_id: token.execution_id,
            document_id: token.document_id,
            execution_status,
        })
    }
}
