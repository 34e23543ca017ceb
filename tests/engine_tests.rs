//! Engine stepping semantics: trigger fan-out, labeled routing, dead-end
//! completion, failure isolation, loop bounding and timer suspension.

mod common;

use common::*;
use serde_json::json;

use docflow::model::IngestSource;
use docflow::{ContextValue, ExecutionStatus, LifecycleEvent, NodeKind, WorkflowStore};

fn document_added(document_id: i64) -> LifecycleEvent {
    LifecycleEvent::DocumentAdded {
        document_id,
        source: IngestSource::Upload,
    }
}

#[tokio::test]
async fn facture_triggers_one_execution_and_contrat_none() {
    let env = TestEnv::new();
    env.manager
        .create_workflow(invoice_approval_draft("Invoice approval"))
        .await
        .unwrap();

    let facture = env.insert_document(document("FACTURE", Some(100.0))).await;
    let outcomes = env.engine.on_event(&document_added(facture)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    let execution_id = outcomes[0].execution_id.unwrap();
    let execution = env.store.execution(execution_id).await.unwrap().unwrap();
    // The graph suspends at the approval gate.
    assert_eq!(execution.status, ExecutionStatus::Waiting);

    let contrat = env.insert_document(document("CONTRAT", Some(100.0))).await;
    let outcomes = env.engine.on_event(&document_added(contrat)).await.unwrap();
    assert!(outcomes.is_empty());
}

#[tokio::test]
async fn routing_follows_output_name_independent_of_insertion_order() {
    let env = TestEnv::new();
    // amount > 1000 branches true/false to different tag actions; the
    // false connection is inserted first to prove insertion order does not
    // decide routing.
    env.manager
        .create_workflow(draft(
            "Branching",
            vec![
                node("trigger", NodeKind::TriggerDocumentAdded, json!({})),
                node(
                    "check",
                    NodeKind::ConditionAmount,
                    json!({"operator": ">", "value": 1000.0}),
                ),
                node(
                    "tag_large",
                    NodeKind::ActionAddTag,
                    json!({"tags": [{"id": 1, "name": "large"}]}),
                ),
                node(
                    "tag_small",
                    NodeKind::ActionAddTag,
                    json!({"tags": [{"id": 2, "name": "small"}]}),
                ),
            ],
            vec![
                connect("trigger", "check", "default"),
                connect("check", "tag_small", "false"),
                connect("check", "tag_large", "true"),
            ],
        ))
        .await
        .unwrap();

    let large = env.insert_document(document("FACTURE", Some(5000.0))).await;
    env.engine.on_event(&document_added(large)).await.unwrap();
    let doc = env.store.document(large).await.unwrap().unwrap();
    assert!(doc.has_tag_id(1));
    assert!(!doc.has_tag_id(2));

    let small = env.insert_document(document("FACTURE", Some(10.0))).await;
    env.engine.on_event(&document_added(small)).await.unwrap();
    let doc = env.store.document(small).await.unwrap().unwrap();
    assert!(doc.has_tag_id(2));
    assert!(!doc.has_tag_id(1));
}

#[tokio::test]
async fn lowest_order_connection_wins_on_tie() {
    let env = TestEnv::new();
    env.manager
        .create_workflow(draft(
            "Tie break",
            vec![
                node("trigger", NodeKind::TriggerDocumentAdded, json!({})),
                node(
                    "tag_a",
                    NodeKind::ActionAddTag,
                    json!({"tags": [{"id": 1, "name": "a"}]}),
                ),
                node(
                    "tag_b",
                    NodeKind::ActionAddTag,
                    json!({"tags": [{"id": 2, "name": "b"}]}),
                ),
            ],
            vec![
                // Same output name; order 1 is inserted before order 0.
                connect_ordered("trigger", "tag_a", "default", 1),
                connect_ordered("trigger", "tag_b", "default", 0),
            ],
        ))
        .await
        .unwrap();

    let doc = env.insert_document(document("FACTURE", None)).await;
    env.engine.on_event(&document_added(doc)).await.unwrap();
    let doc = env.store.document(doc).await.unwrap().unwrap();
    assert!(doc.has_tag_id(2), "order 0 must win the tie");
    assert!(!doc.has_tag_id(1));
}

#[tokio::test]
async fn dead_end_output_completes_execution() {
    let env = TestEnv::new();
    env.manager
        .create_workflow(draft(
            "Dead end",
            vec![
                node("trigger", NodeKind::TriggerDocumentAdded, json!({})),
                node(
                    "check",
                    NodeKind::ConditionAmount,
                    json!({"operator": ">", "value": 1000.0}),
                ),
            ],
            // Only the true branch is wired; a false result has no path.
            vec![connect("trigger", "check", "default")],
        ))
        .await
        .unwrap();

    let doc = env.insert_document(document("FACTURE", Some(1.0))).await;
    let outcomes = env.engine.on_event(&document_added(doc)).await.unwrap();
    let execution = env
        .store
        .execution(outcomes[0].execution_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.error_message.is_none());
    assert!(execution.current_node_id.is_none());
}

#[tokio::test]
async fn fixed_graph_produces_identical_terminal_state() {
    let env = TestEnv::new();
    env.manager
        .create_workflow(draft(
            "Deterministic",
            vec![
                node("trigger", NodeKind::TriggerDocumentAdded, json!({})),
                node(
                    "check",
                    NodeKind::ConditionAmount,
                    json!({"operator": "between", "value": 100.0, "value2": 200.0}),
                ),
                node(
                    "mark",
                    NodeKind::ActionSetValidation,
                    json!({"status": "approved"}),
                ),
            ],
            vec![
                connect("trigger", "check", "default"),
                connect("check", "mark", "true"),
            ],
        ))
        .await
        .unwrap();

    let mut contexts = Vec::new();
    for _ in 0..2 {
        let doc = env.insert_document(document("FACTURE", Some(150.0))).await;
        let outcomes = env.engine.on_event(&document_added(doc)).await.unwrap();
        let execution = env
            .store
            .execution(outcomes[0].execution_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        let mut keys: Vec<(String, ContextValue)> = execution
            .context
            .data()
            .iter()
            .filter(|(k, _)| *k != "document_id")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0));
        contexts.push(keys);
    }
    assert_eq!(contexts[0], contexts[1]);
}

#[tokio::test]
async fn node_failure_is_isolated_per_execution() {
    let env = TestEnv::new();
    // Workflow A fails at run time (unknown operator); workflow B is fine.
    env.manager
        .create_workflow(draft(
            "Broken",
            vec![
                node("trigger", NodeKind::TriggerDocumentAdded, json!({})),
                node(
                    "check",
                    NodeKind::ConditionAmount,
                    json!({"operator": "frobnicate", "value": 1.0}),
                ),
            ],
            vec![connect("trigger", "check", "default")],
        ))
        .await
        .unwrap();
    env.manager
        .create_workflow(draft(
            "Healthy",
            vec![
                node("trigger", NodeKind::TriggerDocumentAdded, json!({})),
                node(
                    "tag",
                    NodeKind::ActionAddTag,
                    json!({"tags": [{"id": 9, "name": "seen"}]}),
                ),
            ],
            vec![connect("trigger", "tag", "default")],
        ))
        .await
        .unwrap();

    let doc = env.insert_document(document("FACTURE", Some(10.0))).await;
    let outcomes = env.engine.on_event(&document_added(doc)).await.unwrap();
    assert_eq!(outcomes.len(), 2);

    let mut statuses = Vec::new();
    for outcome in &outcomes {
        let execution = env
            .store
            .execution(outcome.execution_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        statuses.push((execution.status, execution.error_message));
    }
    statuses.sort_by_key(|(s, _)| format!("{s:?}"));

    assert!(statuses
        .iter()
        .any(|(s, e)| *s == ExecutionStatus::Failed
            && e.as_deref().unwrap_or_default().contains("frobnicate")));
    assert!(statuses
        .iter()
        .any(|(s, _)| *s == ExecutionStatus::Completed));
    let doc = env.store.document(doc).await.unwrap().unwrap();
    assert!(doc.has_tag_id(9));
}

#[tokio::test]
async fn graph_loop_trips_step_limit() {
    let env = TestEnv::new();
    // An empty tag condition always takes the true branch back into
    // itself: a wired retry loop with no exit.
    env.manager
        .create_workflow(draft(
            "Loop",
            vec![
                node("trigger", NodeKind::TriggerDocumentAdded, json!({})),
                node("check", NodeKind::ConditionTag, json!({})),
            ],
            vec![
                connect("trigger", "check", "default"),
                connect("check", "check", "true"),
            ],
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
        .contains("step limit exceeded"));
}

#[tokio::test]
async fn delay_timer_suspends_and_sweep_resumes_after_deadline() {
    let env = TestEnv::new();
    env.manager
        .create_workflow(draft(
            "Delayed tagging",
            vec![
                node("trigger", NodeKind::TriggerDocumentAdded, json!({})),
                node("delay", NodeKind::TimerDelay, json!({"delay_hours": 1})),
                node(
                    "tag",
                    NodeKind::ActionAddTag,
                    json!({"tags": [{"id": 3, "name": "aged"}]}),
                ),
            ],
            vec![
                connect("trigger", "delay", "default"),
                connect("delay", "tag", "default"),
            ],
        ))
        .await
        .unwrap();

    let doc = env.insert_document(document("FACTURE", None)).await;
    let outcomes = env.engine.on_event(&document_added(doc)).await.unwrap();
    let execution_id = outcomes[0].execution_id.unwrap();

    let execution = env.store.execution(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Waiting);
    assert_eq!(execution.waiting_for.as_deref(), Some("timer"));
    assert_eq!(execution.waiting_until, Some(t0() + chrono::Duration::hours(1)));

    // Deadline not reached: the sweep leaves it alone.
    let report = env.engine.sweep_expired().await.unwrap();
    assert!(report.resumed.is_empty());

    env.clock.advance(chrono::Duration::hours(2));
    let report = env.engine.sweep_expired().await.unwrap();
    assert_eq!(report.resumed, vec![execution_id]);

    let execution = env.store.execution(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    let doc = env.store.document(doc).await.unwrap().unwrap();
    assert!(doc.has_tag_id(3));

    // Re-running the sweep is a no-op.
    let report = env.engine.sweep_expired().await.unwrap();
    assert!(report.resumed.is_empty() && report.skipped.is_empty());
}

#[tokio::test]
async fn disabled_workflow_is_skipped_but_still_resumes() {
    let env = TestEnv::new();
    let workflow = env
        .manager
        .create_workflow(invoice_approval_draft("Invoice approval"))
        .await
        .unwrap();

    let doc = env.insert_document(document("FACTURE", Some(50.0))).await;
    let outcomes = env.engine.on_event(&document_added(doc)).await.unwrap();
    let execution_id = outcomes[0].execution_id.unwrap();

    env.manager
        .set_enabled(workflow.definition.id, false)
        .await
        .unwrap();

    // No new executions while disabled.
    let doc2 = env.insert_document(document("FACTURE", Some(60.0))).await;
    assert!(env.engine.on_event(&document_added(doc2)).await.unwrap().is_empty());

    // The in-flight execution still resumes to completion.
    let token = env.open_token(execution_id).await;
    let resolution = env
        .approvals
        .resolve(&token, docflow::DecisionAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(resolution.execution_status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn manual_start_requires_manual_entry_node() {
    let env = TestEnv::new();
    let with_manual = env
        .manager
        .create_workflow(draft(
            "Manual",
            vec![
                node("start", NodeKind::TriggerManual, json!({})),
                node(
                    "tag",
                    NodeKind::ActionAddTag,
                    json!({"tags": [{"id": 4, "name": "manual"}]}),
                ),
            ],
            vec![connect("start", "tag", "default")],
        ))
        .await
        .unwrap();
    let without_manual = env
        .manager
        .create_workflow(invoice_approval_draft("Invoice approval"))
        .await
        .unwrap();

    let doc = env.insert_document(document("NOTE", None)).await;
    let execution_id = env
        .engine
        .start_manual(with_manual.definition.id, Some(doc))
        .await
        .unwrap();
    let execution = env.store.execution(execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);

    let err = env
        .engine
        .start_manual(without_manual.definition.id, Some(doc))
        .await
        .unwrap_err();
    assert!(matches!(err, docflow::EngineError::NoEntryPoint(_)));
}

#[tokio::test]
async fn email_action_interpolates_and_dedupes_on_replay() {
    let env = TestEnv::new();
    env.manager
        .create_workflow(invoice_approval_draft("Invoice approval"))
        .await
        .unwrap();

    let doc = env.insert_document(document("FACTURE", Some(900.0))).await;
    let outcomes = env.engine.on_event(&document_added(doc)).await.unwrap();
    let execution_id = outcomes[0].execution_id.unwrap();

    assert_eq!(env.mailer.sent_count(), 1);
    let sent = env.mailer.sent.lock().unwrap()[0].clone();
    assert_eq!(sent.subject, "Approval needed: FACTURE document");
    assert!(sent.body.contains("https://dms.test/approve/tok-0?action=approve"));

    // The approval resolution re-enters the graph at the wait node; the
    // mail node is not re-run, and even if it were, the context marker
    // suppresses a duplicate send.
    let token = env.open_token(execution_id).await;
    env.approvals
        .resolve(&token, docflow::DecisionAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(env.mailer.sent_count(), 1);
}
