//! Remote API error types

use thiserror::Error;

/// Errors surfaced by the data exchange API and the local state store
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Revision not found: {0}")]
    RevisionNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the error means the addressed entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::RevisionNotFound(_) | CloudError::JobNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
