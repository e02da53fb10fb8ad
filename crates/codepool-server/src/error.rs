//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use codepool::LedgerError;

const INTERNAL_MESSAGE: &str = "Internal server error.";

/// An error answered as `{"request_id": ..., "error": ...}`.
#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    request_id: Option<&'a str>,
    error: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            request_id: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// A 500 that reveals nothing about the cause.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }

    /// Attach the request id to echo back.
    pub fn with_request_id(mut self, request_id: Option<&str>) -> Self {
        self.request_id = request_id.map(String::from);
        self
    }

    /// Map a ledger error onto its response.
    pub fn from_ledger(err: LedgerError, request_id: Option<&str>) -> Self {
        let status =
            StatusCode::from_u16(err.suggested_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match &err {
            LedgerError::PoolNotFound(_) => "Unique code pool does not exist.".to_string(),
            LedgerError::AuditMismatch { .. } => {
                "This request has already been performed with different parameters.".to_string()
            }
            LedgerError::CannotRedeem { reason, .. } => {
                format!("Cannot redeem unique code: {}", reason)
            }
            LedgerError::Invalid(e) => e.to_string(),
            LedgerError::Store(e) => {
                error!(error = %e, "storage failure");
                INTERNAL_MESSAGE.to_string()
            }
        };
        Self::new(status, message).with_request_id(request_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            request_id: self.request_id.as_deref(),
            error: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
