//! Action nodes: mutate the subject document or perform an external side
//! effect. Outward-facing actions (mail, webhook) dedupe on replay with a
//! context marker keyed by node id, since a crash between the side effect
//! and persistence re-invokes the node.

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::executor::{
    ConfigField, ConfigType, ExecutorEnv, NodeExecutor, NodeRunResult, DEFAULT_OUTPUT,
};
use super::util::parse_config;
use crate::context::{ContextBag, ContextValue};
use crate::error::NodeError;
use crate::model::{ApprovalToken, TagRef, ValidationStatus, WorkflowNode};
use crate::store::ValidationChange;

/// Issue an approval token for an execution and expose the links as node
/// outputs. Shared by [`CreateApprovalAction`] and the standalone mode of
/// the approval wait node.
pub(crate) async fn issue_approval_token(
    node: &WorkflowNode,
    ctx: &mut ContextBag,
    env: &ExecutorEnv,
    assigned_user_id: Option<i64>,
    assigned_group_id: Option<i64>,
    message: Option<String>,
    expires_hours: Option<i64>,
) -> Result<ApprovalToken, NodeError> {
    let now = env.runtime.time.now();
    let hours = expires_hours.unwrap_or(env.config.default_approval_expiry_hours);
    let mut token = ApprovalToken {
        id: 0,
        token: env.runtime.tokens.approval_token(),
        execution_id: env.execution_id,
        node_id: node.id,
        document_id: env.document_id,
        assigned_user_id,
        assigned_group_id,
        message,
        expires_at: now + Duration::hours(hours),
        response_action: None,
        response_comment: None,
        responded_at: None,
        created_at: now,
    };
    env.store.insert_token(&mut token).await?;

    let base = env.config.base_url.trim_end_matches('/');
    let approve_url = format!("{base}/approve/{}?action=approve", token.token);
    let reject_url = format!("{base}/approve/{}?action=reject", token.token);

    ctx.register_node_name(node.id, node.name.clone());
    ctx.set_node_output(node.id, "approval_token", token.token.clone());
    ctx.set_node_output(node.id, "approval_link", approve_url.clone());
    ctx.set_node_output(node.id, "reject_link", reject_url.clone());
    ctx.set_node_output(node.id, "expires_at", token.expires_at.to_rfc3339());
    ctx.set_node_output(node.id, "token_id", token.id);
    if let Some(document_id) = env.document_id {
        let view_url = format!("{base}/documents/{document_id}");
        ctx.set_node_output(node.id, "view_link", view_url.clone());
        ctx.set("view_link", view_url);
    }

    // Global mirrors so a following wait or email node finds the token
    // without an explicit source reference.
    ctx.set("approval_token", token.token.clone());
    ctx.set("approval_link", approve_url);
    ctx.set("reject_link", reject_url);
    ctx.set("approval_expires_at", token.expires_at.to_rfc3339());

    debug!(
        execution = env.execution_id,
        node = node.id,
        token_id = token.id,
        "approval token issued"
    );
    Ok(token)
}

// --- Create approval ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateApprovalConfig {
    assign_to_user_id: Option<i64>,
    assign_to_group_id: Option<i64>,
    message: Option<String>,
    expires_hours: Option<i64>,
}

/// Creates an approval token and continues immediately; pair with a
/// `wait_approval` node to actually suspend.
pub struct CreateApprovalAction;

#[async_trait]
impl NodeExecutor for CreateApprovalAction {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        if env.document_id.is_none() {
            return Ok(NodeRunResult::failed("no document attached to execution"));
        }
        let cfg: CreateApprovalConfig = parse_config(&node.config)?;
        let token = issue_approval_token(
            node,
            ctx,
            env,
            cfg.assign_to_user_id,
            cfg.assign_to_group_id,
            cfg.message,
            cfg.expires_hours,
        )
        .await?;

        let mut data = HashMap::new();
        data.insert("token_id".into(), ContextValue::Integer(token.id));
        data.insert(
            "expires_at".into(),
            ContextValue::String(token.expires_at.to_rfc3339()),
        );
        Ok(NodeRunResult::success(data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "assign_to_user_id",
                ConfigType::Integer,
                false,
                "Approver user id",
            ),
            ConfigField::new(
                "assign_to_group_id",
                ConfigType::Integer,
                false,
                "Approver group id",
            ),
            ConfigField::new(
                "message",
                ConfigType::String,
                false,
                "Message stored with the token and shown on the decision page",
            ),
            ConfigField::new(
                "expires_hours",
                ConfigType::Integer,
                false,
                "Token lifetime in hours (default: engine policy, 30 days)",
            ),
        ]
    }
}

// --- Send email ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SendEmailConfig {
    to: Option<String>,
    subject: Option<String>,
    body: Option<String>,
}

pub struct SendEmailAction;

#[async_trait]
impl NodeExecutor for SendEmailAction {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: SendEmailConfig = parse_config(&node.config)?;
        let Some(to) = cfg.to.filter(|t| !t.trim().is_empty()) else {
            return Ok(NodeRunResult::failed("email recipient not configured"));
        };

        // Replay dedupe: skip if this node already sent in this execution.
        let marker = format!("email_sent_{}", node.id);
        if ctx.get(&marker).and_then(ContextValue::as_bool) == Some(true) {
            debug!(execution = env.execution_id, node = node.id, "email already sent, skipping");
            return Ok(NodeRunResult::success(HashMap::new()));
        }

        let document = env.document().await?;
        let recipients: Vec<String> = to
            .split(',')
            .map(str::trim)
            .filter(|r| r.contains('@'))
            .map(str::to_string)
            .collect();
        if recipients.is_empty() {
            return Ok(NodeRunResult::failed("no valid email recipient"));
        }

        let subject = ctx.interpolate(
            cfg.subject.as_deref().unwrap_or("Document notification"),
            Some(&document),
        );
        let body = ctx.interpolate(cfg.body.as_deref().unwrap_or(""), Some(&document));

        let mail = crate::services::OutgoingMail {
            to: recipients.clone(),
            subject,
            body,
        };
        env.mailer.send(&mail).await?;
        ctx.set(marker, true);

        let mut data = HashMap::new();
        data.insert(
            "sent_to".into(),
            ContextValue::Json(json!(recipients)),
        );
        Ok(NodeRunResult::success(data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "to",
                ConfigType::String,
                true,
                "Recipient address(es), comma-separated",
            ),
            ConfigField::new(
                "subject",
                ConfigType::String,
                false,
                "Subject template; {title}, {approval_link}, {node.key} placeholders",
            ),
            ConfigField::new(
                "body",
                ConfigType::String,
                false,
                "Body template; same placeholders as subject",
            ),
        ]
    }
}

// --- Webhook ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WebhookConfig {
    url: Option<String>,
    payload: Option<Value>,
}

pub struct WebhookAction;

#[async_trait]
impl NodeExecutor for WebhookAction {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: WebhookConfig = parse_config(&node.config)?;
        let Some(url) = cfg.url.filter(|u| !u.is_empty()) else {
            return Ok(NodeRunResult::failed("webhook url not configured"));
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Ok(NodeRunResult::failed(format!("invalid webhook url: {url}")));
        }

        let marker = format!("webhook_sent_{}", node.id);
        if ctx.get(&marker).and_then(ContextValue::as_bool) == Some(true) {
            debug!(execution = env.execution_id, node = node.id, "webhook already sent, skipping");
            return Ok(NodeRunResult::success(HashMap::new()));
        }

        let document = env.document().await?;
        let mut payload = json!({
            "document_id": document.id,
            "title": document.title,
            "original_filename": document.original_filename,
            "document_type_code": document.document_type_code,
            "correspondent_id": document.correspondent_id,
            "amount": document.amount,
            "workflow_id": env.workflow_id,
            "execution_id": env.execution_id,
        });
        if let (Some(merged), Some(Value::Object(custom))) =
            (payload.as_object_mut(), cfg.payload)
        {
            for (key, value) in custom {
                let value = match value {
                    Value::String(s) => Value::String(ctx.interpolate(&s, Some(&document))),
                    other => other,
                };
                merged.insert(key, value);
            }
        }

        let status = env.webhooks.post_json(&url, &payload).await?;
        if !(200..300).contains(&status) {
            warn!(execution = env.execution_id, node = node.id, status, "webhook rejected");
            return Ok(NodeRunResult::failed(format!(
                "webhook returned status {status}"
            )));
        }
        ctx.set(marker, true);

        let mut data = HashMap::new();
        data.insert("webhook_status".into(), ContextValue::Integer(status as i64));
        Ok(NodeRunResult::success(data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new("url", ConfigType::String, true, "Target URL (http/https)"),
            ConfigField::new(
                "payload",
                ConfigType::Object,
                false,
                "Extra JSON fields merged into the default payload; string values are interpolated",
            ),
        ]
    }
}

// --- Add tag ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddTagConfig {
    tags: Vec<TagRef>,
}

pub struct AddTagAction;

#[async_trait]
impl NodeExecutor for AddTagAction {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: AddTagConfig = parse_config(&node.config)?;
        if cfg.tags.is_empty() {
            return Ok(NodeRunResult::failed("no tags configured"));
        }
        let document = env.document().await?;
        env.store.add_document_tags(document.id, &cfg.tags).await?;

        let mut data = HashMap::new();
        data.insert(
            "added_tags".into(),
            ContextValue::Json(json!(cfg.tags.iter().map(|t| t.id).collect::<Vec<_>>())),
        );
        Ok(NodeRunResult::success(data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![ConfigField::new(
            "tags",
            ConfigType::Array,
            true,
            "Tags to attach, as {id, name} pairs",
        )]
    }
}

// --- Assign user / group ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssignUserConfig {
    user_id: Option<i64>,
}

pub struct AssignUserAction;

#[async_trait]
impl NodeExecutor for AssignUserAction {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: AssignUserConfig = parse_config(&node.config)?;
        let Some(user_id) = cfg.user_id else {
            return Ok(NodeRunResult::failed("user_id not configured"));
        };
        let document = env.document().await?;
        env.store
            .assign_document(document.id, Some(user_id), None)
            .await?;

        let mut data = HashMap::new();
        data.insert("assigned_user_id".into(), ContextValue::Integer(user_id));
        Ok(NodeRunResult::success(data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![ConfigField::new(
            "user_id",
            ConfigType::Integer,
            true,
            "User the document is assigned to",
        )]
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssignGroupConfig {
    group_id: Option<i64>,
}

pub struct AssignGroupAction;

#[async_trait]
impl NodeExecutor for AssignGroupAction {
    async fn execute(
        &self,
        node: &WorkflowNode,
        _ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: AssignGroupConfig = parse_config(&node.config)?;
        let Some(group_id) = cfg.group_id else {
            return Ok(NodeRunResult::failed("group_id not configured"));
        };
        let document = env.document().await?;
        env.store
            .assign_document(document.id, None, Some(group_id))
            .await?;

        let mut data = HashMap::new();
        data.insert("assigned_group_id".into(), ContextValue::Integer(group_id));
        Ok(NodeRunResult::success(data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![ConfigField::new(
            "group_id",
            ConfigType::Integer,
            true,
            "Group the document is assigned to",
        )]
    }
}

// --- Set validation status ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SetValidationConfig {
    status: Option<ValidationStatus>,
    validated_by_user_id: Option<i64>,
    comment: Option<String>,
    validation_level: Option<i32>,
}

pub struct SetValidationAction;

#[async_trait]
impl NodeExecutor for SetValidationAction {
    async fn execute(
        &self,
        node: &WorkflowNode,
        ctx: &mut ContextBag,
        env: &ExecutorEnv,
    ) -> Result<NodeRunResult, NodeError> {
        let cfg: SetValidationConfig = parse_config(&node.config)?;
        let Some(status) = cfg.status else {
            return Ok(NodeRunResult::failed("validation status not configured"));
        };
        let document = env.document().await?;
        let previous = document.validation_status;

        // Approver and comment fall back to what the approval flow injected.
        let validated_by = cfg
            .validated_by_user_id
            .or_else(|| ctx.get("approver_user_id").and_then(ContextValue::as_i64));
        let comment = cfg.comment.or_else(|| {
            ctx.get("decision_comment")
                .and_then(ContextValue::as_str)
                .map(str::to_string)
        });

        env.store
            .set_document_validation(
                document.id,
                ValidationChange {
                    status,
                    level: cfg.validation_level.unwrap_or(1),
                    validated_by,
                    comment,
                    at: env.runtime.time.now(),
                },
            )
            .await?;

        let output = match status {
            ValidationStatus::Approved => "approved",
            ValidationStatus::Rejected => "rejected",
            ValidationStatus::Na => "na",
            ValidationStatus::Pending => DEFAULT_OUTPUT,
        };
        let mut data = HashMap::new();
        data.insert("status".into(), ContextValue::from(status.as_str()));
        data.insert(
            "previous_status".into(),
            ContextValue::from(previous.as_str()),
        );
        Ok(NodeRunResult::success_with(output, data))
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new(
                "status",
                ConfigType::String,
                true,
                "Validation status to apply: pending, approved, rejected or na",
            ),
            ConfigField::new(
                "validated_by_user_id",
                ConfigType::Integer,
                false,
                "Validating user (falls back to the approval context)",
            ),
            ConfigField::new("comment", ConfigType::String, false, "Validation comment"),
            ConfigField::new(
                "validation_level",
                ConfigType::Integer,
                false,
                "Level for multi-level validation chains (default 1)",
            ),
        ]
    }

    fn outputs(&self) -> &'static [&'static str] {
        &["approved", "rejected", "na", DEFAULT_OUTPUT]
    }
}
