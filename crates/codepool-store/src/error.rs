//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The pool's namespace has not been created.
    #[error("unique code pool does not exist: {0}")]
    PoolNotFound(String),

    /// An audit row for this request id already exists in the pool.
    ///
    /// Raised by the unique constraint when a concurrent first-time request
    /// committed first.
    #[error("request {0} has already been recorded")]
    DuplicateRequest(String),

    /// Payload serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The connection lock was poisoned by a panicking holder.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// The blocking worker running a store operation failed.
    #[error("store task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
