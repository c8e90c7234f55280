//! Error types for the forensic engine

use std::io;
use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while running forensic operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Investigation, evidence, or source transaction absent
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Malformed or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller does not hold access to the investigation
    #[error("Access denied: caller {caller_id} may not access investigation {investigation_id}")]
    AccessDenied {
        investigation_id: String,
        caller_id: String,
    },

    /// Investigation status change not permitted by the lifecycle
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Detector failure surfaced outside of the comprehensive runner
    #[error("Detector '{detector}' failed: {reason}")]
    Detector { detector: String, reason: String },

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Connection lock poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    LockPoisoned,

    /// I/O error (evidence file hashing, config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Template rendering error
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    /// True for the errors a caller can fix by changing its input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. }
                | EngineError::Validation(_)
                | EngineError::AccessDenied { .. }
                | EngineError::InvalidTransition { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = EngineError::not_found("Investigation", "inv-1");
        assert_eq!(err.to_string(), "Investigation not found: inv-1");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_storage_error_is_not_client_error() {
        let err = EngineError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(!err.is_client_error());
        assert!(err.to_string().starts_with("Storage error"));
    }
}
