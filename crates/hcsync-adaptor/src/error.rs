//! Vendor adaptor error types

use hcsync_core::{ResourceKind, SyncError, Vendor};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdaptorError {
    #[error("{0} not found in PATH. Install and configure the vendor CLI first")]
    CliNotFound(String),

    #[error("{program} command failed: {stderr}")]
    CommandFailed { program: String, stderr: String },

    #[error("Unexpected {program} output: {message}")]
    UnexpectedOutput { program: String, message: String },

    #[error("{vendor} adapter does not list {kind}")]
    Unsupported { vendor: Vendor, kind: ResourceKind },

    #[error("{vendor} scope is missing {field}")]
    MissingScope { vendor: Vendor, field: &'static str },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AdaptorError {
    pub fn unexpected(program: &str, message: impl Into<String>) -> Self {
        AdaptorError::UnexpectedOutput {
            program: program.to_string(),
            message: message.into(),
        }
    }
}

impl From<AdaptorError> for SyncError {
    fn from(err: AdaptorError) -> Self {
        match err {
            AdaptorError::Unsupported { .. } | AdaptorError::MissingScope { .. } => {
                SyncError::Validation(err.to_string())
            }
            other => SyncError::Adapter(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdaptorError>;
