//! Domain model: workflow graphs, executions, approval tokens, documents
//! and lifecycle events.

mod approval;
mod document;
mod event;
mod execution;
mod workflow;

pub use approval::{ApprovalToken, Decision, DecisionRecord};
pub use document::{Document, IngestSource, TagRef, ValidationEvent, ValidationStatus};
pub use event::LifecycleEvent;
pub use execution::{Execution, ExecutionStatus};
pub use workflow::{NodeKind, WorkflowConnection, WorkflowDefinition, WorkflowNode};
