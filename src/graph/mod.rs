//! Save-time graph validation.

mod validator;

pub use validator::{validate_workflow, Diagnostic, Severity, ValidationReport};
