//! Store error types.
//!
//! One enum for the whole crate; callers match on the category and use `?`
//! throughout. Backend failures keep the driver error intact.

use thiserror::Error;

/// Error for store operations.
///
/// Returned by every fallible operation on the store, the planner, and the
/// migration runner. `Database` wraps the driver's error unchanged so callers
/// can inspect SQLSTATE codes when they need to.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Namespace failed validation (empty, empty label, `.` in a label, or
    /// reserved root label).
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Invalid store configuration (e.g. zero embedding dimensions, a
    /// malformed index path, or pipeline mode combined with a pool source).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An operation required embeddings but no embedder is configured.
    #[error("no embedder configured: {0}")]
    MissingEmbedder(String),

    /// A schema migration statement failed; the version table was not
    /// advanced for it.
    #[error("migration {version} failed: {source}")]
    Migration {
        version: usize,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Backend failure, wrapping the driver's error unchanged.
    #[error("database: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Connection acquisition or runtime plumbing failed (pool checkout,
    /// dropped scheduler).
    #[error("connection: {0}")]
    Connection(String),

    /// JSON or namespace encoding/decoding failed.
    #[error("serialization: {0}")]
    Serialization(String),

    /// The configured embedder failed or broke its output contract.
    #[error("embedding: {0}")]
    Embedding(String),

    /// A store implementation broke the batch contract (wrong result kind
    /// or count for an operation).
    #[error("internal: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
