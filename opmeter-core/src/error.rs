//! Error types for opmeter.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for opmeter operations.
pub type Result<T> = std::result::Result<T, MeterError>;

/// Main error type for opmeter.
#[derive(Error, Debug)]
pub enum MeterError {
    // Storage errors
    #[error("Storage error during {operation}: {reason}")]
    Storage { operation: &'static str, reason: String },

    #[error("Database migration failed: {reason}")]
    MigrationFailed { reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MeterError {
    /// Create a Storage error tagged with the store operation that failed.
    pub fn storage(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Storage { operation, reason: err.to_string() }
    }

    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }

    /// Whether this error came from the persistence layer.
    ///
    /// Callers use this to tell a lost record apart from a broken setup.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::MigrationFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_are_distinguishable() {
        let err = MeterError::storage("save", "disk I/O error");
        assert!(err.is_storage());
        assert_eq!(err.to_string(), "Storage error during save: disk I/O error");

        let err = MeterError::InvalidConfig { reason: "bad".to_string() };
        assert!(!err.is_storage());
    }
}
