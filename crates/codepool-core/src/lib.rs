//! # Codepool Core
//!
//! Pure types for unique code pools: codes, audit entries, import records and
//! code canonicalization.
//!
//! This crate contains no I/O and no storage. Everything the ledger persists or
//! compares is defined here so the store and engine crates agree on shape.
//!
//! ## Key Types
//!
//! - [`PoolName`] - Validated name of an isolated code pool
//! - [`UniqueCode`] - One code row and its lifecycle state
//! - [`AuditEntry`] - Immutable record of one redemption attempt
//! - [`ImportAuditEntry`] - Immutable record of one bulk import
//! - [`AuditParams`] - The request id plus identity of a redemption
//!
//! ## Canonicalization
//!
//! Codes are compared in canonical form. See [`canonical`] module.

pub mod canonical;
pub mod error;
pub mod types;

pub use canonical::{canonicalize, is_canonical};
pub use error::CoreError;
pub use types::{
    now_millis, AuditEntry, AuditField, AuditParams, CodeCount, CodeRecord, ImportAuditEntry,
    PoolName, RedeemRequest, RedeemedCode, RejectReason, Rejection, UniqueCode,
};
