//! Strong type definitions for unique code pools.
//!
//! Rows are plain structs; names that cross a trust boundary are newtypes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Maximum length of a pool name, in characters.
pub const MAX_POOL_NAME_LEN: usize = 255;

/// The name of an isolated unique code pool.
///
/// Pool names double as URL path segments, so they are non-empty, bounded,
/// and never contain `/`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PoolName(String);

impl PoolName {
    /// Validate and wrap a pool name.
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        if name.is_empty() || name.chars().count() > MAX_POOL_NAME_LEN || name.contains('/') {
            return Err(CoreError::InvalidPoolName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolName({})", self.0)
    }
}

impl fmt::Display for PoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PoolName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PoolName> for String {
    fn from(name: PoolName) -> Self {
        name.0
    }
}

impl FromStr for PoolName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identity of a redemption request.
///
/// `request_id` is the client's idempotency key; `transaction_id` and
/// `user_id` must match on every retry of the same request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditParams {
    pub request_id: String,
    pub transaction_id: String,
    pub user_id: String,
}

impl AuditParams {
    pub fn new(
        request_id: impl Into<String>,
        transaction_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            transaction_id: transaction_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// A stored unique code.
///
/// `used` starts false and, once true, never reverts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueCode {
    /// Stable surrogate key.
    pub id: i64,
    /// The code as stored.
    pub unique_code: String,
    /// Category tag, e.g. a product line.
    pub flavour: String,
    pub used: bool,
    /// Unix ms.
    pub created_at: i64,
    /// Unix ms.
    pub modified_at: i64,
    /// Cause of the last state change, if any.
    pub reason: Option<String>,
}

impl UniqueCode {
    /// The public field set of this code (timestamps omitted).
    pub fn public_view(&self) -> RedeemedCode {
        RedeemedCode {
            id: self.id,
            unique_code: self.unique_code.clone(),
            flavour: self.flavour.clone(),
            used: self.used,
            reason: self.reason.clone(),
        }
    }
}

/// Public fields of a redeemed code.
///
/// This is what a successful redemption records in the audit log and what a
/// replay hands back, so it must round-trip through JSON unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemedCode {
    pub id: i64,
    pub unique_code: String,
    pub flavour: String,
    pub used: bool,
    pub reason: Option<String>,
}

/// One row of a bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeRecord {
    pub flavour: String,
    pub unique_code: String,
}

impl CodeRecord {
    pub fn new(flavour: impl Into<String>, unique_code: impl Into<String>) -> Self {
        Self {
            flavour: flavour.into(),
            unique_code: unique_code.into(),
        }
    }
}

/// Number of codes with a given flavour and used state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeCount {
    pub flavour: String,
    pub used: bool,
    pub count: u64,
}

/// Why a code could not be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectReason {
    /// No such code in the pool.
    Invalid,
    /// The code has already been redeemed.
    Used,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Invalid => "invalid",
            RejectReason::Used => "used",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid" => Ok(RejectReason::Invalid),
            "used" => Ok(RejectReason::Used),
            other => Err(CoreError::InvalidRejectReason(other.to_string())),
        }
    }
}

/// Response payload recorded for a failed redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: RejectReason,
    /// The canonical code that was attempted.
    pub unique_code: String,
}

/// Request payload recorded for a redemption.
///
/// Holds the raw candidate code exactly as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub candidate_code: String,
}

/// An immutable audit log row for one redemption request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub request_id: String,
    pub transaction_id: String,
    pub user_id: String,
    pub request_data: Value,
    pub response_data: Value,
    pub error: bool,
    /// Unix ms.
    pub created_at: i64,
    /// Canonical code the request resolved to, kept for query-by-code.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub unique_code: Option<String>,
}

impl AuditEntry {
    /// The identity this entry was recorded under.
    pub fn params(&self) -> AuditParams {
        AuditParams::new(&self.request_id, &self.transaction_id, &self.user_id)
    }
}

/// An immutable import log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportAuditEntry {
    pub request_id: String,
    pub content_fingerprint: String,
    /// Unix ms.
    pub created_at: i64,
}

/// Audit log fields that can be queried by equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditField {
    RequestId,
    TransactionId,
    UserId,
    UniqueCode,
}

impl AuditField {
    pub const ALL: [AuditField; 4] = [
        AuditField::RequestId,
        AuditField::TransactionId,
        AuditField::UserId,
        AuditField::UniqueCode,
    ];

    /// Column / wire name of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditField::RequestId => "request_id",
            AuditField::TransactionId => "transaction_id",
            AuditField::UserId => "user_id",
            AuditField::UniqueCode => "unique_code",
        }
    }

    /// Read this field from an entry.
    pub fn value_of<'a>(&self, entry: &'a AuditEntry) -> Option<&'a str> {
        match self {
            AuditField::RequestId => Some(&entry.request_id),
            AuditField::TransactionId => Some(&entry.transaction_id),
            AuditField::UserId => Some(&entry.user_id),
            AuditField::UniqueCode => entry.unique_code.as_deref(),
        }
    }
}

impl fmt::Display for AuditField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditField {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| CoreError::InvalidAuditField(s.to_string()))
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
