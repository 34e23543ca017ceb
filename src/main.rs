//! Demo: an invoice approval workflow end to end against the in-memory
//! store — document arrives, approval is requested and emailed, the
//! execution suspends, the link is "clicked", the document ends approved.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use docflow::model::{Document, IngestSource, ValidationStatus};
use docflow::{
    ApprovalService, ConnectionDraft, DecisionAction, ExecutionEngine, LifecycleEvent,
    MemoryStore, NodeDraft, NodeExecutorRegistry, NodeKind, RuntimeContext, WorkflowDraft,
    WorkflowManager, WorkflowStore,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== docflow — invoice approval demo ===\n");

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(NodeExecutorRegistry::new());
    let runtime = RuntimeContext::default();
    let engine = Arc::new(
        ExecutionEngine::new(store.clone())
            .with_registry(registry.clone())
            .with_runtime(runtime.clone()),
    );
    let approvals = ApprovalService::new(store.clone(), engine.clone(), runtime);
    let manager = WorkflowManager::new(store.clone(), registry);

    let workflow = manager
        .create_workflow(WorkflowDraft {
            name: "Invoice approval".into(),
            description: Some("Large invoices need a supervisor decision".into()),
            enabled: true,
            canvas_data: None,
            nodes: vec![
                NodeDraft {
                    key: "trigger".into(),
                    kind: NodeKind::TriggerDocumentAdded,
                    name: "Invoice arrives".into(),
                    config: json!({
                        "filter_document_type_codes": ["FACTURE"],
                        "filter_min_amount": 1000.0
                    }),
                    is_entry_point: true,
                },
                NodeDraft {
                    key: "approval".into(),
                    kind: NodeKind::ActionCreateApproval,
                    name: "approval".into(),
                    config: json!({"assign_to_user_id": 42, "expires_hours": 72}),
                    is_entry_point: false,
                },
                NodeDraft {
                    key: "mail".into(),
                    kind: NodeKind::ActionSendEmail,
                    name: "Notify supervisor".into(),
                    config: json!({
                        "to": "supervisor@corp.test",
                        "subject": "Approval needed: {title}",
                        "body": "Amount {amount} {currency}. Approve: {approval_link}"
                    }),
                    is_entry_point: false,
                },
                NodeDraft {
                    key: "wait".into(),
                    kind: NodeKind::WaitApproval,
                    name: "Wait for decision".into(),
                    config: json!({}),
                    is_entry_point: false,
                },
                NodeDraft {
                    key: "mark".into(),
                    kind: NodeKind::ActionSetValidation,
                    name: "Mark approved".into(),
                    config: json!({"status": "approved"}),
                    is_entry_point: false,
                },
            ],
            connections: vec![
                ConnectionDraft {
                    from: "trigger".into(),
                    to: "approval".into(),
                    output_name: "default".into(),
                    order: 0,
                    label: None,
                },
                ConnectionDraft {
                    from: "approval".into(),
                    to: "mail".into(),
                    output_name: "default".into(),
                    order: 0,
                    label: None,
                },
                ConnectionDraft {
                    from: "mail".into(),
                    to: "wait".into(),
                    output_name: "default".into(),
                    order: 0,
                    label: None,
                },
                ConnectionDraft {
                    from: "wait".into(),
                    to: "mark".into(),
                    output_name: "approved".into(),
                    order: 0,
                    label: Some("Approved".into()),
                },
            ],
        })
        .await
        .expect("workflow creation");
    println!("workflow #{} saved\n", workflow.definition.id);

    let mut invoice = Document {
        id: 0,
        title: "Invoice 2026-117".into(),
        original_filename: Some("invoice_2026_117.pdf".into()),
        document_type_id: Some(1),
        document_type_code: Some("FACTURE".into()),
        correspondent_id: Some(9),
        amount: Some(4800.0),
        currency: Some("CHF".into()),
        doc_date: None,
        tags: vec![],
        source: IngestSource::Upload,
        validation_status: ValidationStatus::Pending,
        validation_level: 1,
        validated_by: None,
        validated_at: None,
        validation_comment: None,
        assigned_user_id: None,
        assigned_group_id: None,
        custom_fields: HashMap::new(),
    };
    store.insert_document(&mut invoice).await.expect("document insert");

    let outcomes = engine
        .on_event(&LifecycleEvent::DocumentAdded {
            document_id: invoice.id,
            source: IngestSource::Upload,
        })
        .await
        .expect("event dispatch");

    let execution_id = outcomes
        .first()
        .and_then(|o| o.execution_id)
        .expect("one execution started");
    let execution = store
        .execution(execution_id)
        .await
        .expect("execution lookup")
        .expect("execution exists");
    println!(
        "execution #{execution_id} is {:?}, waiting_until {:?}\n",
        execution.status, execution.waiting_until
    );

    // The supervisor clicks the emailed link.
    let token = store
        .latest_open_token(execution_id)
        .await
        .expect("token lookup")
        .expect("open token");
    let resolution = approvals
        .resolve(&token.token, DecisionAction::Approve, Some("Looks fine".into()))
        .await
        .expect("approval resolution");
    println!(
        "decision {:?} -> execution {:?}",
        resolution.decision, resolution.execution_status
    );

    let invoice = store
        .document(invoice.id)
        .await
        .expect("document lookup")
        .expect("document exists");
    println!("document validation status: {}", invoice.validation_status);
}
