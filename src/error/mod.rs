//! Error types, split by layer: node-level failures, engine/workflow-level
//! failures, and approval-resolution failures.

mod approval_error;
mod engine_error;
mod node_error;

pub use approval_error::ApprovalError;
pub use engine_error::EngineError;
pub use node_error::NodeError;
