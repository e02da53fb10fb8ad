//! Error types for the Codepool Core.

use thiserror::Error;

/// Errors raised while constructing core values from untrusted input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid pool name: {0}")]
    InvalidPoolName(String),

    #[error("invalid audit field: {0}")]
    InvalidAuditField(String),

    #[error("invalid reject reason: {0}")]
    InvalidRejectReason(String),
}
