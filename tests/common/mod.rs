#![allow(dead_code)]

//! Shared fixtures: an engine wired to the in-memory store with a
//! controllable clock, deterministic tokens and recording transports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use docflow::model::{Document, IngestSource, TagRef, ValidationStatus};
use docflow::{
    ApprovalService, ConnectionDraft, EngineConfig, ExecutionEngine, FakeTimeProvider,
    FakeTokenGenerator, Mailer, MemoryStore, NodeDraft, NodeError, NodeExecutorRegistry,
    NodeKind, OutgoingMail, RuntimeContext, WebhookTransport, WorkflowDraft, WorkflowManager,
    WorkflowStore,
};

pub const T0: &str = "2026-03-01T09:00:00Z";

pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), NodeError> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

pub struct RecordingWebhook {
    pub calls: Mutex<Vec<(String, Value)>>,
    pub status: u16,
}

impl RecordingWebhook {
    pub fn new(status: u16) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            status,
        }
    }
}

#[async_trait]
impl WebhookTransport for RecordingWebhook {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<u16, NodeError> {
        self.calls.lock().unwrap().push((url.to_string(), payload.clone()));
        Ok(self.status)
    }
}

pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<ExecutionEngine>,
    pub approvals: ApprovalService,
    pub manager: WorkflowManager,
    pub clock: Arc<FakeTimeProvider>,
    pub mailer: Arc<RecordingMailer>,
    pub webhooks: Arc<RecordingWebhook>,
}

impl TestEnv {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(NodeExecutorRegistry::new());
        let clock = Arc::new(FakeTimeProvider::new(t0()));
        let runtime = RuntimeContext {
            time: clock.clone(),
            tokens: Arc::new(FakeTokenGenerator::new("tok")),
        };
        let mailer = Arc::new(RecordingMailer::new());
        let webhooks = Arc::new(RecordingWebhook::new(200));
        let engine = Arc::new(
            ExecutionEngine::new(store.clone())
                .with_registry(registry.clone())
                .with_runtime(runtime.clone())
                .with_mailer(mailer.clone())
                .with_webhooks(webhooks.clone())
                .with_config(EngineConfig {
                    max_steps: 25,
                    base_url: "https://dms.test".into(),
                    default_approval_expiry_hours: 30 * 24,
                }),
        );
        let approvals = ApprovalService::new(store.clone(), engine.clone(), runtime);
        let manager = WorkflowManager::new(store.clone(), registry);
        TestEnv {
            store,
            engine,
            approvals,
            manager,
            clock,
            mailer,
            webhooks,
        }
    }

    pub async fn insert_document(&self, mut document: Document) -> i64 {
        self.store.insert_document(&mut document).await.unwrap();
        document.id
    }

    pub async fn open_token(&self, execution_id: i64) -> String {
        self.store
            .latest_open_token(execution_id)
            .await
            .unwrap()
            .expect("an open approval token")
            .token
    }
}

pub fn t0() -> DateTime<Utc> {
    T0.parse().unwrap()
}

pub fn document(code: &str, amount: Option<f64>) -> Document {
    Document {
        id: 0,
        title: format!("{code} document"),
        original_filename: Some("scan_0001.pdf".into()),
        document_type_id: Some(1),
        document_type_code: Some(code.into()),
        correspondent_id: Some(5),
        amount,
        currency: Some("CHF".into()),
        doc_date: None,
        tags: Vec::new(),
        source: IngestSource::Upload,
        validation_status: ValidationStatus::Pending,
        validation_level: 1,
        validated_by: None,
        validated_at: None,
        validation_comment: None,
        assigned_user_id: None,
        assigned_group_id: None,
        custom_fields: HashMap::new(),
    }
}

pub fn tagged(mut doc: Document, tags: &[(i64, &str)]) -> Document {
    doc.tags = tags
        .iter()
        .map(|(id, name)| TagRef {
            id: *id,
            name: name.to_string(),
        })
        .collect();
    doc
}

pub fn node(key: &str, kind: NodeKind, config: Value) -> NodeDraft {
    NodeDraft {
        key: key.into(),
        kind,
        name: key.into(),
        config,
        is_entry_point: kind.is_trigger(),
    }
}

pub fn connect(from: &str, to: &str, output: &str) -> ConnectionDraft {
    connect_ordered(from, to, output, 0)
}

pub fn connect_ordered(from: &str, to: &str, output: &str, order: i32) -> ConnectionDraft {
    ConnectionDraft {
        from: from.into(),
        to: to.into(),
        output_name: output.into(),
        order,
        label: None,
    }
}

pub fn draft(name: &str, nodes: Vec<NodeDraft>, connections: Vec<ConnectionDraft>) -> WorkflowDraft {
    WorkflowDraft {
        name: name.into(),
        description: None,
        enabled: true,
        canvas_data: None,
        nodes,
        connections,
    }
}

/// trigger(FACTURE) → create approval → notify → wait → mark approved:
/// the workflow most tests run against.
pub fn invoice_approval_draft(name: &str) -> WorkflowDraft {
    draft(
        name,
        vec![
            node(
                "trigger",
                NodeKind::TriggerDocumentAdded,
                json!({"filter_document_type_codes": ["FACTURE"]}),
            ),
            node(
                "approval",
                NodeKind::ActionCreateApproval,
                json!({"assign_to_user_id": 42}),
            ),
            node(
                "mail",
                NodeKind::ActionSendEmail,
                json!({
                    "to": "supervisor@corp.test",
                    "subject": "Approval needed: {title}",
                    "body": "Approve: {approval_link}"
                }),
            ),
            node("wait", NodeKind::WaitApproval, json!({})),
            node(
                "mark",
                NodeKind::ActionSetValidation,
                json!({"status": "approved"}),
            ),
            node(
                "mark_rejected",
                NodeKind::ActionSetValidation,
                json!({"status": "rejected"}),
            ),
        ],
        vec![
            connect("trigger", "approval", "default"),
            connect("approval", "mail", "default"),
            connect("mail", "wait", "default"),
            connect("wait", "mark", "approved"),
            connect("wait", "mark_rejected", "rejected"),
        ],
    )
}
