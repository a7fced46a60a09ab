//! Error types for notegraph
//!
//! Parser-level issues are not errors: parsers return diagnostics alongside
//! a best-effort result so the host can degrade gracefully. This module
//! covers validation failures, conflicts, and store-level failures.

use thiserror::Error;

/// Errors that can occur during engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    // Validation errors: the caller must fix its input
    #[error("invalid tag name {name:?}: {reason}")]
    InvalidTagName { name: String, reason: String },

    #[error("invalid {context}: {value}")]
    InvalidValue { context: String, value: String },

    // Conflicts: recoverable by retry or rename
    #[error("tag name already in use: {name} (existing tag {existing_id})")]
    DuplicateTagName { name: String, existing_id: String },

    #[error("re-parenting tag {tag_id} under {parent_id} would create a cycle")]
    CyclicHierarchy { tag_id: String, parent_id: String },

    #[error("cannot merge into tag {tag_id}: {reason}")]
    InvalidMergeTarget { tag_id: String, reason: String },

    // Terminal for the call only
    #[error("{context} not found: {value}")]
    NotFound { context: String, value: String },

    // Store-level failures: recoverable by retry with backoff
    #[error("store timed out during {operation}")]
    StoreTimeout { operation: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to {operation}: {reason}")]
    FailedOperation { operation: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Create an error for a failed database operation
    pub fn db_operation(operation: &str, error: impl std::fmt::Display) -> Self {
        EngineError::FailedOperation {
            operation: operation.to_string(),
            reason: error.to_string(),
        }
    }

    /// Create an error for a failed transaction operation
    pub fn transaction(operation: &str, error: impl std::fmt::Display) -> Self {
        EngineError::FailedOperation {
            operation: format!("{} transaction", operation),
            reason: error.to_string(),
        }
    }

    /// Create an error for an entity that was not found
    pub fn not_found(context: &str, value: impl std::fmt::Display) -> Self {
        EngineError::NotFound {
            context: context.to_string(),
            value: value.to_string(),
        }
    }

    /// Create an error for an invalid value
    pub fn invalid_value(context: &str, value: impl std::fmt::Display) -> Self {
        EngineError::InvalidValue {
            context: context.to_string(),
            value: value.to_string(),
        }
    }

    /// Whether the failed call may be retried as-is (possibly with backoff)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EngineError::StoreTimeout { .. } | EngineError::StoreUnavailable(_)
        )
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                EngineError::StoreTimeout {
                    operation: "store access".to_string(),
                }
            }
            _ => EngineError::StoreUnavailable(err.to_string()),
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
