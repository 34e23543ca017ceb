//! The approval gate. Suspends the execution until an external resume call
//! carries a human decision; on re-entry it consults the injected decision
//! (or the token's recorded response) before deciding whether to suspend
//! again.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::actions::issue_approval_token;
use super::executor::{ConfigField, ConfigType, ExecutorEnv, NodeExecutor, NodeRunResult};
use super::util::parse_config;
use crate::context::{ContextBag, ContextValue};
use crate::error::NodeError;
use crate::model::{ApprovalToken, WorkflowNode};

/// What happens when the wait deadline passes without a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    /// Expiry fails the execution.
    #[default]
    Fail,
    /// Expiry follows the `timeout` output path.
    Continue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApprovalWaitConfig {
    /// Node whose `approval_token` output to wait on; auto-detected when
    /// absent.
    token_source_node_id: Option<i64>,
    // Standalone mode: create the token here instead of a preceding
    // create-approval action.
    assign_to_user_id: Option<i64>,
    assign_to_group_id: Option<i64>,
    message: Option<String>,
    expires_hours: Option<i64>,
    timeout_action: TimeoutAction,
}

pub struct ApprovalWait;

impl ApprovalWait {
    /// Token lookup order: explicit source node, context bag, latest open
    /// token of the execution.
    async fn find_token(
        ctx: &ContextBag,
        cfg: &ApprovalWaitConfig,
        env: &ExecutorEnv,
    ) -> Result<Option<ApprovalToken>, NodeError> {
        if let Some(source) = cfg.token_source_node_id {
            if let Some(value) = ctx.node_output(source, "approval_token") {
                let token = value.to_display();
                return Ok(env.store.token_by_value(&token).await?);
            }
        }
        if let Some(value) = ctx.get("approval_token") {
            let token = value.to_display();
            if let Some(found) = env.store.token_by_value(&token).await? {
                return Ok(Some(found));
            }
        }
        Ok(env.store.latest_open_token(env.execution_id).await?)
    }
}

#[async_trait]
impl NodeExecutor for ApprovalWait {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: ApprovalWaitConfig = parse_config(&node.config)?;

        // Re-entry after resume: the engine injected the decision, consume
        // it and branch instead of suspending again.
        if let Some(decision) = ctx.remove("decision") {
            let output = decision.to_display();
            let mut data = HashMap::new();
            data.insert("decision".into(), ContextValue::from(output.clone()));
            if let Some(comment) = ctx.remove("decision_comment") {
                data.insert("decision_comment".into(), comment);
            }
            debug!(execution = env.execution_id, node = node.id, decision = %output, "approval decided");
            return Ok(NodeRunResult::success_with(output, data));
        }
        ctx.remove("wait_expired");

        let token = match Self::find_token(ctx, &cfg, env).await? {
            Some(token) => token,
            None => {
                if cfg.assign_to_user_id.is_none() && cfg.assign_to_group_id.is_none() {
                    return Ok(NodeRunResult::failed(
                        "no approval token in scope; add a create-approval action before this \
                         node or configure an assignee for standalone mode",
                    ));
                }
                issue_approval_token(
                    node,
                    ctx,
                    env,
                    cfg.assign_to_user_id,
                    cfg.assign_to_group_id,
                    cfg.message.clone(),
                    cfg.expires_hours,
                )
                .await?
            }
        };

        // The decision may have landed before this node was (re)entered.
        if let Some(decision) = token.response_action {
            let mut data = HashMap::new();
            data.insert("decision".into(), ContextValue::from(decision.as_output()));
            if let Some(comment) = token.response_comment {
                data.insert("decision_comment".into(), ContextValue::String(comment));
            }
            return Ok(NodeRunResult::success_with(decision.as_output(), data));
        }

        let now = env.runtime.time.now();
        if token.is_expired(now) {
            return Ok(match cfg.timeout_action {
                TimeoutAction::Fail => {
                    NodeRunResult::failed("approval expired before a decision was made")
                }
                TimeoutAction::Continue => {
                    let mut data = HashMap::new();
                    data.insert("decision".into(), ContextValue::from("timeout"));
                    NodeRunResult::success_with("timeout", data)
                }
            });
        }

        let wait_seconds = (token.expires_at - now).num_seconds().max(0);
        Ok(NodeRunResult::waiting(
            Some(token.token.clone()),
            Some(wait_seconds),
            HashMap::new(),
        ))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "token_source_node_id",
                ConfigType::Integer,
                false,
                "Create-approval node whose token to wait on (auto-detected when absent)",
            ),
            ConfigField::new(
                "assign_to_user_id",
                ConfigType::Integer,
                false,
                "Approver user id (standalone mode)",
            ),
            ConfigField::new(
                "assign_to_group_id",
                ConfigType::Integer,
                false,
                "Approver group id (standalone mode)",
            ),
            ConfigField::new(
                "message",
                ConfigType::String,
                false,
                "Message stored with a standalone token",
            ),
            ConfigField::new(
                "expires_hours",
                ConfigType::Integer,
                false,
                "Standalone token lifetime in hours",
            ),
            ConfigField::new(
                "timeout_action",
                ConfigType::String,
                false,
                "fail (default) or continue via the timeout output",
            ),
        ]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["approved", "rejected", "timeout"]
    }
}
