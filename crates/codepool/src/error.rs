//! Error types for the ledger engine.

use codepool_core::{CoreError, RejectReason};
use codepool_store::StoreError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The pool has not been created.
    #[error("unique code pool does not exist: {0}")]
    PoolNotFound(String),

    /// The request id was already used with different parameters.
    ///
    /// Permanent for that request id.
    #[error("request {request_id} has already been performed with different parameters")]
    AuditMismatch { request_id: String },

    /// The code cannot be redeemed. An expected outcome, not a fault.
    #[error("cannot redeem unique code {code}: {reason}")]
    CannotRedeem { reason: RejectReason, code: String },

    /// Invalid caller input.
    #[error("invalid input: {0}")]
    Invalid(#[from] CoreError),

    /// Storage error. Propagated unchanged; callers retry with the same
    /// request id.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::PoolNotFound(pool) => LedgerError::PoolNotFound(pool),
            other => LedgerError::Store(other),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Store(StoreError::Serialization(e))
    }
}

impl LedgerError {
    /// Suggested response status for a transport layer.
    pub fn suggested_status(&self) -> u16 {
        match self {
            LedgerError::PoolNotFound(_) => 404,
            LedgerError::AuditMismatch { .. } | LedgerError::Invalid(_) => 400,
            LedgerError::CannotRedeem { .. } => 200,
            LedgerError::Store(_) => 500,
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
