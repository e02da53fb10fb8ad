//! Audit rows as the HTTP API renders them.

use serde::Serialize;
use serde_json::Value;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::error;

use codepool::AuditEntry;

use crate::error::ApiError;

/// One `audit_query` result.
#[derive(Debug, Serialize)]
pub struct AuditRecord {
    pub request_id: String,
    pub transaction_id: String,
    pub user_id: String,
    pub request_data: Value,
    pub response_data: Value,
    pub error: bool,
    pub created_at: String,
}

impl AuditRecord {
    pub fn from_entry(entry: AuditEntry) -> Result<Self, ApiError> {
        Ok(Self {
            created_at: iso_timestamp(entry.created_at)?,
            request_id: entry.request_id,
            transaction_id: entry.transaction_id,
            user_id: entry.user_id,
            request_data: entry.request_data,
            response_data: entry.response_data,
            error: entry.error,
        })
    }
}

/// Render Unix milliseconds as naive UTC ISO-8601 with microseconds,
/// e.g. `2023-11-14T22:13:20.123000`.
pub fn iso_timestamp(millis: i64) -> Result<String, ApiError> {
    let layout =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]");
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|at| at.format(layout).ok())
        .ok_or_else(|| {
            error!(millis, "audit timestamp out of range");
            ApiError::internal()
        })
}
