//! Approval subsystem: single-use tokens, expiry precedence, concurrent
//! resolution and the resume contract.

mod common;

use common::*;
use serde_json::json;

use docflow::model::{IngestSource, ValidationStatus};
use docflow::{
    ApprovalError, Decision, DecisionAction, EngineError, ExecutionStatus, LifecycleEvent,
    NodeKind, WorkflowStore,
};

fn document_added(document_id: i64) -> LifecycleEvent {
    LifecycleEvent::DocumentAdded {
        document_id,
        source: IngestSource::Upload,
    }
}

async fn start_invoice_workflow(env: &TestEnv) -> (i64, i64) {
    env.manager
        .create_workflow(invoice_approval_draft("Invoice approval"))
        .await
        .unwrap();
    let doc = env.insert_document(document("FACTURE", Some(2500.0))).await;
    let outcomes = env.engine.on_event(&document_added(doc)).await.unwrap();
    (doc, outcomes[0].execution_id.unwrap())
}

#[tokio::test]
async fn approval_within_window_completes_execution() {
    let env = TestEnv::new();
    let (doc, execution_id) = start_invoice_workflow(&env).await;

    let execution = env.store.execution(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Waiting);
    assert_eq!(execution.waiting_for.as_deref(), Some("tok-0"));
    // Default policy: 30 days.
    assert_eq!(
        execution.waiting_until,
        Some(t0() + chrono::Duration::days(30))
    );

    let resolution = env
        .approvals
        .resolve("tok-0", DecisionAction::Approve, Some("ok by me".into()))
        .await
        .unwrap();
    assert_eq!(resolution.decision, Decision::Approved);
    assert_eq!(resolution.execution_status, ExecutionStatus::Completed);

    // Token consumed exactly once, with the decision recorded.
    let token = env.store.token_by_value("tok-0").await.unwrap().unwrap();
    assert_eq!(token.response_action, Some(Decision::Approved));
    assert_eq!(token.response_comment.as_deref(), Some("ok by me"));
    assert_eq!(token.responded_at, Some(t0()));

    // Exactly one decision-history row.
    let decisions = env.store.decisions(execution_id).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].decision, Decision::Approved);
    assert_eq!(decisions[0].token_id, token.id);

    // Document validation reflects the decision.
    let doc = env.store.document(doc).await.unwrap().unwrap();
    assert_eq!(doc.validation_status, ValidationStatus::Approved);
}

#[tokio::test]
async fn rejection_routes_to_rejected_branch() {
    let env = TestEnv::new();
    let (doc, execution_id) = start_invoice_workflow(&env).await;

    let resolution = env
        .approvals
        .resolve("tok-0", DecisionAction::Reject, Some("wrong amount".into()))
        .await
        .unwrap();
    assert_eq!(resolution.decision, Decision::Rejected);
    assert_eq!(resolution.execution_status, ExecutionStatus::Completed);

    let execution = env.store.execution(execution_id).await.unwrap().unwrap();
    assert_eq!(
        execution
            .context
            .get("decision")
            .and_then(docflow::ContextValue::as_str),
        Some("rejected")
    );
    let doc = env.store.document(doc).await.unwrap().unwrap();
    assert_eq!(doc.validation_status, ValidationStatus::Rejected);
}

#[tokio::test]
async fn second_resolution_sees_original_decision() {
    let env = TestEnv::new();
    let (_, execution_id) = start_invoice_workflow(&env).await;

    env.approvals
        .resolve("tok-0", DecisionAction::Approve, None)
        .await
        .unwrap();

    // A later opposite click reports the first decision and changes
    // nothing.
    let err = env
        .approvals
        .resolve("tok-0", DecisionAction::Reject, Some("too late".into()))
        .await
        .unwrap_err();
    match err {
        ApprovalError::AlreadyProcessed {
            decision,
            responded_at,
            ..
        } => {
            assert_eq!(decision, Decision::Approved);
            assert_eq!(responded_at, t0());
        }
        other => panic!("expected AlreadyProcessed, got {other}"),
    }
    assert_eq!(env.store.decisions(execution_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_resolutions_yield_exactly_one_winner() {
    let env = TestEnv::new();
    let (doc, execution_id) = start_invoice_workflow(&env).await;

    let approve = env
        .approvals
        .resolve("tok-0", DecisionAction::Approve, None);
    let reject = env
        .approvals
        .resolve("tok-0", DecisionAction::Reject, None);
    let (a, b) = tokio::join!(approve, reject);

    let (winner, loser) = match (&a, &b) {
        (Ok(res), Err(err)) => (res.decision, err),
        (Err(err), Ok(res)) => (res.decision, err),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    match loser {
        ApprovalError::AlreadyProcessed { decision, .. } => {
            assert_eq!(*decision, winner, "loser must observe the winner's decision");
        }
        other => panic!("expected AlreadyProcessed, got {other}"),
    }

    // Zero additional state mutation from the loser: one decision row,
    // and only the winner's path touched validation (the resolution plus
    // the mark node it routed to).
    assert_eq!(env.store.decisions(execution_id).await.unwrap().len(), 1);
    assert_eq!(env.store.validation_history(doc).await.unwrap().len(), 2);
    let execution = env.store.execution(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    let doc = env.store.document(doc).await.unwrap().unwrap();
    assert_eq!(doc.validation_status, ValidationStatus::from(winner));
}

#[tokio::test]
async fn expired_token_always_reports_expired() {
    let env = TestEnv::new();
    let (_, execution_id) = start_invoice_workflow(&env).await;

    env.clock.advance(chrono::Duration::days(31));
    let err = env
        .approvals
        .resolve("tok-0", DecisionAction::Approve, None)
        .await
        .unwrap_err();
    match err {
        ApprovalError::Expired { expires_at } => {
            assert_eq!(expires_at, t0() + chrono::Duration::days(30));
        }
        other => panic!("expected Expired, got {other}"),
    }

    // Nothing was consumed or resumed.
    let token = env.store.token_by_value("tok-0").await.unwrap().unwrap();
    assert!(!token.is_responded());
    let execution = env.store.execution(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Waiting);
    assert!(env.store.decisions(execution_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn expiry_sweep_fails_the_waiting_execution_by_default() {
    let env = TestEnv::new();
    let (_, execution_id) = start_invoice_workflow(&env).await;

    env.clock.advance(chrono::Duration::days(31));
    let report = env.engine.sweep_expired().await.unwrap();
    assert_eq!(report.resumed, vec![execution_id]);

    let execution = env.store.execution(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution
        .error_message
        .unwrap()
        .contains("approval expired"));
}

#[tokio::test]
async fn timeout_action_continue_follows_timeout_branch() {
    let env = TestEnv::new();
    env.manager
        .create_workflow(draft(
            "Escalating approval",
            vec![
                node("trigger", NodeKind::TriggerDocumentAdded, json!({})),
                node(
                    "wait",
                    NodeKind::WaitApproval,
                    json!({
                        "assign_to_user_id": 7,
                        "expires_hours": 24,
                        "timeout_action": "continue"
                    }),
                ),
                node(
                    "tag_late",
                    NodeKind::ActionAddTag,
                    json!({"tags": [{"id": 11, "name": "late"}]}),
                ),
            ],
            vec![
                connect("trigger", "wait", "default"),
                connect("wait", "tag_late", "timeout"),
            ],
        ))
        .await
        .unwrap();

    let doc = env.insert_document(document("FACTURE", None)).await;
    let outcomes = env.engine.on_event(&document_added(doc)).await.unwrap();
    let execution_id = outcomes[0].execution_id.unwrap();

    env.clock.advance(chrono::Duration::hours(25));
    let report = env.engine.sweep_expired().await.unwrap();
    assert_eq!(report.resumed, vec![execution_id]);

    let execution = env.store.execution(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    let doc = env.store.document(doc).await.unwrap().unwrap();
    assert!(doc.has_tag_id(11));
}

#[tokio::test]
async fn invalid_token_is_rejected() {
    let env = TestEnv::new();
    start_invoice_workflow(&env).await;

    let err = env
        .approvals
        .resolve("not-a-token", DecisionAction::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApprovalError::InvalidToken));
}

#[tokio::test]
async fn resume_requires_waiting_status() {
    let env = TestEnv::new();
    let (_, execution_id) = start_invoice_workflow(&env).await;

    env.approvals
        .resolve("tok-0", DecisionAction::Approve, None)
        .await
        .unwrap();

    let err = env
        .engine
        .resume(execution_id, "approved", None)
        .await
        .unwrap_err();
    match err {
        EngineError::NotWaiting { status, .. } => {
            assert_eq!(status, ExecutionStatus::Completed);
        }
        other => panic!("expected NotWaiting, got {other}"),
    }
}

#[tokio::test]
async fn inspect_is_read_only() {
    let env = TestEnv::new();
    start_invoice_workflow(&env).await;

    let token = env.approvals.inspect("tok-0").await.unwrap();
    assert_eq!(token.assigned_user_id, Some(42));
    assert!(!token.is_responded());

    env.approvals
        .resolve("tok-0", DecisionAction::Approve, None)
        .await
        .unwrap();
    assert!(matches!(
        env.approvals.inspect("tok-0").await.unwrap_err(),
        ApprovalError::AlreadyProcessed { .. }
    ));
    assert!(matches!(
        env.approvals.inspect("missing").await.unwrap_err(),
        ApprovalError::InvalidToken
    ));
}

#[tokio::test]
async fn standalone_wait_issues_its_own_token() {
    let env = TestEnv::new();
    env.manager
        .create_workflow(draft(
            "Standalone gate",
            vec![
                node("trigger", NodeKind::TriggerDocumentAdded, json!({})),
                node(
                    "wait",
                    NodeKind::WaitApproval,
                    json!({"assign_to_group_id": 3, "message": "please review"}),
                ),
                node(
                    "mark",
                    NodeKind::ActionSetValidation,
                    json!({"status": "approved"}),
                ),
            ],
            vec![
                connect("trigger", "wait", "default"),
                connect("wait", "mark", "approved"),
            ],
        ))
        .await
        .unwrap();

    let doc = env.insert_document(document("FACTURE", None)).await;
    let outcomes = env.engine.on_event(&document_added(doc)).await.unwrap();
    let execution_id = outcomes[0].execution_id.unwrap();

    let token = env
        .store
        .latest_open_token(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(token.assigned_group_id, Some(3));
    assert_eq!(token.message.as_deref(), Some("please review"));

    let resolution = env
        .approvals
        .resolve(&token.token, DecisionAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(resolution.execution_status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn cancelled_execution_stays_cancelled_after_resolution() {
    let env = TestEnv::new();
    let (_, execution_id) = start_invoice_workflow(&env).await;

    let status = env.engine.cancel(execution_id).await.unwrap();
    assert_eq!(status, ExecutionStatus::Cancelled);
    // Cancelling twice is a no-op.
    let status = env.engine.cancel(execution_id).await.unwrap();
    assert_eq!(status, ExecutionStatus::Cancelled);

    // A late click still records the decision on the token, but the
    // execution does not move.
    let resolution = env
        .approvals
        .resolve("tok-0", DecisionAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(resolution.execution_status, ExecutionStatus::Cancelled);
    let execution = env.store.execution(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert!(execution.waiting_for.is_none());
}

#[tokio::test]
async fn wait_without_token_or_assignee_fails() {
    let env = TestEnv::new();
    env.manager
        .create_workflow(draft(
            "Misconfigured gate",
            vec![
                node("trigger", NodeKind::TriggerDocumentAdded, json!({})),
                node("wait", NodeKind::WaitApproval, json!({})),
            ],
            vec![connect("trigger", "wait", "default")],
        ))
        .await
        .unwrap();

    let doc = env.insert_document(document("FACTURE", None)).await;
    let outcomes = env.engine.on_event(&document_added(doc)).await.unwrap();
    let execution = env
        .store
        .execution(outcomes[0].execution_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution
        .error_message
        .unwrap()
        .contains("no approval token in scope"));
}
