//! Error types for the diagnostic report engine.
//!
//! One enum covers the whole subsystem so callers can match on a single
//! taxonomy: validation, not-found, forbidden, conflict, locked, and
//! state-precondition failures. Individual calculated-field failures are
//! *not* errors at this level; they degrade to `None` and a log line.

use crate::report::ReportStatus;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Bad or missing input, with the offending field named.
    #[error("validation failed for field '{field}': {message}")]
    Validation { field: String, message: String },

    /// Invalid input that is not attributable to a single field.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A template, report, or patient could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller may not perform this operation (system template edit,
    /// cross-hospital access).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A uniqueness constraint was violated (duplicate template code).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A write was attempted on a locked report outside the amendment path.
    #[error("report is locked: {0}")]
    Locked(String),

    /// A workflow operation was invoked from a status that does not permit it.
    #[error("operation '{operation}' is not allowed while report status is {status}")]
    InvalidState {
        operation: &'static str,
        status: ReportStatus,
    },

    #[error("failed to serialize report data: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReportError {
    /// Shorthand for a field-level validation failure.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ReportError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<dxr_types::TextError> for ReportError {
    fn from(err: dxr_types::TextError) -> Self {
        ReportError::InvalidInput(err.to_string())
    }
}

pub type ReportResult<T> = std::result::Result<T, ReportError>;
