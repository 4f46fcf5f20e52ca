//! Error types for the audit crate.

use thiserror::Error;

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A schema with this id has already been created.
    #[error("schema {0} already exists")]
    SchemaExists(String),

    /// The referenced schema does not exist.
    #[error("schema {0} not found")]
    SchemaNotFound(String),

    /// The schema definition is not acceptable.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// The referenced record does not exist.
    #[error("record {0} not found")]
    RecordNotFound(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Failed to query audit records.
    #[error("failed to query audit records: {0}")]
    QueryFailed(String),

    /// Failed to export audit records.
    #[error("export failed: {0}")]
    ExportFailed(String),

    /// Signing or signature verification failed.
    #[error("signature error: {0}")]
    Signature(String),

    /// The writer did not finish draining within the shutdown timeout.
    /// The flush still completes in the background; only the wait is bounded.
    #[error("audit writer did not drain within {0:?}")]
    ShutdownTimeout(std::time::Duration),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
