use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxBuildError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Session file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Descriptor error: {0}")]
    Descriptor(String),

    #[error("Pubkey count {pubkeys} does not match signature count {signatures}")]
    PubkeyCountMismatch { signatures: usize, pubkeys: usize },

    #[error("Unresolved parameter: {0} (pass it explicitly or record a descriptor for the input)")]
    UnresolvedParameter(&'static str),

    #[error("{operation} failed: {message}")]
    Crypto {
        operation: &'static str,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl TxBuildError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn crypto(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Crypto {
            operation,
            message: err.to_string(),
        }
    }
}
