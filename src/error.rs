//! Error types for the Datastore adapter
//!
//! `AdapterError` is the only error shape the ORM layer ever sees. Backend
//! specific failures arrive as [`RemoteError`](crate::client::RemoteError)
//! and are translated by the transaction coordinator before they surface.

use thiserror::Error;

use crate::client::RemoteError;

/// Result type alias using AdapterError
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Unified error type for adapter operations
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    /// Stored shape does not match the model (data corruption or schema drift)
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // -------------------------------------------------------------------------
    // Constraint Errors
    // -------------------------------------------------------------------------
    #[error("Unique constraint violation for kind {kind} on fields: {}", .fields.join(", "))]
    UniqueConstraintViolation {
        kind: String,
        fields: Vec<String>,
        values: Vec<String>,
    },

    #[error("Integrity error: {0}")]
    Integrity(String),

    // -------------------------------------------------------------------------
    // Transaction Errors
    // -------------------------------------------------------------------------
    /// Optimistic concurrency collision.
    ///
    /// `attempts` is the number of transaction attempts made before giving
    /// up. A value of 0 means the conflict was raised mid-transaction and the
    /// enclosing retry loop has not seen it yet.
    #[error("Transaction conflict after {attempts} attempt(s)")]
    TransactionConflict { attempts: u32 },

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    // -------------------------------------------------------------------------
    // Remote Errors
    // -------------------------------------------------------------------------
    #[error("Database unavailable, retry: {0}")]
    RemoteUnavailable(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The backend rejected a request as malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Query Errors
    // -------------------------------------------------------------------------
    #[error("Not supported: {0}")]
    NotSupported(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AdapterError {
    /// Whether a caller may reasonably retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::TransactionConflict { .. }
                | AdapterError::RemoteUnavailable(_)
                | AdapterError::DeadlineExceeded(_)
        )
    }

    /// The generic "database unavailable, retry" condition
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            AdapterError::RemoteUnavailable(_) | AdapterError::DeadlineExceeded(_)
        )
    }

    /// Per-field attribution for validation errors shown to users.
    ///
    /// Returns `(field, message)` pairs; empty for non-validation errors.
    pub fn field_errors(&self) -> Vec<(String, String)> {
        match self {
            AdapterError::UniqueConstraintViolation { kind, fields, .. } => fields
                .iter()
                .map(|field| {
                    (
                        field.clone(),
                        format!("{} with this {} already exists", kind, fields.join(" and ")),
                    )
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// A conflict that the enclosing retry loop should handle
    pub(crate) fn conflict() -> Self {
        AdapterError::TransactionConflict { attempts: 0 }
    }
}

impl From<RemoteError> for AdapterError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Conflict(_) => AdapterError::conflict(),
            RemoteError::Unavailable(msg) => AdapterError::RemoteUnavailable(msg),
            RemoteError::DeadlineExceeded(msg) => AdapterError::DeadlineExceeded(msg),
            RemoteError::PermissionDenied(msg) => AdapterError::PermissionDenied(msg),
            RemoteError::InvalidArgument(msg) => AdapterError::InvalidArgument(msg),
            RemoteError::NotFound(msg) => AdapterError::TransactionFailed(msg),
        }
    }
}
