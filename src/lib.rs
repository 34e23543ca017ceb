//! # docflow — document workflow execution engine
//!
//! `docflow` routes documents through graph-based workflows: automated
//! steps, conditional branches and human approval gates. It implements:
//!
//! - **Node execution**: trigger, condition, action, wait and timer nodes
//!   dispatched through a typed executor registry.
//! - **Pausable executions**: an approval gate suspends its execution as an
//!   inert database row; an emailed single-use token resumes it with the
//!   human decision, days later, with no thread parked in between.
//! - **Trigger matching**: document-added, tag-added and
//!   validation-changed events fan out to every enabled workflow whose
//!   entry filters match.
//! - **Labeled routing**: executors emit an output name (`approved`,
//!   `rejected`, `true`, `false`, ...) and the engine follows the matching
//!   connection, lowest `order` first.
//! - **Optimistic concurrency**: executions carry a version; concurrent
//!   resume attempts are decided by a compare-and-swap and the approval
//!   token's atomic single-use consumption.
//! - **Save-time validation**: reachability, trigger-typed entry points
//!   and per-kind config schemas, checked before a graph is persisted.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docflow::{ExecutionEngine, LifecycleEvent, MemoryStore};
//! use docflow::model::IngestSource;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let engine = ExecutionEngine::new(store);
//!     let outcomes = engine
//!         .on_event(&LifecycleEvent::DocumentAdded {
//!             document_id: 1,
//!             source: IngestSource::Upload,
//!         })
//!         .await
//!         .unwrap();
//!     println!("{outcomes:?}");
//! }
//! ```

pub mod approval;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod manager;
pub mod model;
pub mod nodes;
pub mod runtime;
pub mod services;
pub mod store;

pub use crate::approval::{ApprovalService, DecisionAction, Resolution};
pub use crate::context::{ContextBag, ContextValue};
pub use crate::engine::{EngineConfig, ExecutionEngine, SweepReport, TriggerOutcome};
pub use crate::error::{ApprovalError, EngineError, NodeError};
pub use crate::graph::{Diagnostic, Severity, ValidationReport};
pub use crate::manager::{
    ConnectionDraft, NodeDraft, WorkflowDraft, WorkflowGraph, WorkflowManager,
};
pub use crate::model::{
    ApprovalToken, Decision, DecisionRecord, Document, Execution, ExecutionStatus, LifecycleEvent,
    NodeKind, WorkflowConnection, WorkflowDefinition, WorkflowNode,
};
pub use crate::nodes::{NodeExecutor, NodeExecutorRegistry, NodeRunResult, NodeRunStatus};
pub use crate::runtime::{
    FakeTimeProvider, FakeTokenGenerator, RandTokenGenerator, RealTimeProvider, RuntimeContext,
    TimeProvider, TokenGenerator,
};
pub use crate::services::{
    HttpWebhookTransport, LogMailer, Mailer, OutgoingMail, WebhookTransport,
};
pub use crate::store::{MemoryStore, StoreError, TokenConsumption, WorkflowStore};
