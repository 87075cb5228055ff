//! Reconciliation error types

use crate::model::ResourceKind;
use thiserror::Error;

/// Errors raised by the reconciliation engine
///
/// Every variant aborts the current stage. Nothing is retried inside the
/// engine; the caller owns retry and backoff.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A provider call failed
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// A dependency lookup matched no stored record
    #[error("{kind} not found in store: {cloud_id}")]
    NotFound {
        kind: ResourceKind,
        cloud_id: String,
    },

    /// Malformed scope or record, rejected before any network call or write
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A batch create/update/delete was rejected as a whole
    #[error("Batch write failed: {0}")]
    BatchWrite(String),

    /// Store contents broke a uniqueness guarantee
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("State file error: {0}")]
    State(String),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    pub fn not_found(kind: ResourceKind, cloud_id: impl Into<String>) -> Self {
        SyncError::NotFound {
            kind,
            cloud_id: cloud_id.into(),
        }
    }

    /// Whether the error reports a missing dependency record
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
