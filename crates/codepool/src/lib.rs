//! # Codepool
//!
//! An idempotent ledger for pools of single-use codes.
//!
//! ## Overview
//!
//! A pool holds codes imported in bulk. Each code can be redeemed exactly
//! once. Every redemption request carries a client-chosen request id, and
//! the outcome of the first request with that id is recorded in the pool's
//! audit log:
//!
//! - **Redemption**: Resolves a candidate code and atomically marks it used
//! - **Replay**: A retried request id gets the recorded outcome back, success
//!   or failure, without touching the code again
//! - **Mismatch**: A request id reused with different parameters is rejected
//! - **Imports**: A batch is applied at most once per request id and content
//!   fingerprint
//!
//! ## Usage
//!
//! ```rust,no_run
//! use codepool::{CodePools, LedgerConfig};
//! use codepool::core::{AuditParams, CodeRecord, PoolName};
//! use codepool::store::SqliteStore;
//!
//! async fn example() -> codepool::Result<()> {
//!     let store = SqliteStore::open("codes.db")?;
//!     let pools = CodePools::new(store, LedgerConfig::default());
//!
//!     let pool = PoolName::new("summer")?;
//!     pools.create_pool(&pool).await?;
//!     pools
//!         .import_codes(&pool, "import-1", "fingerprint", vec![CodeRecord::new("vanilla", "v0")])
//!         .await?;
//!
//!     let params = AuditParams::new("req-1", "tx-1", "user-1");
//!     let code = pools.redeem(&pool, "V-0", &params).await?;
//!     assert!(code.used);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `codepool::core` - Pure types and canonicalization
//! - `codepool::store` - Storage abstraction, SQLite and in-memory backends

pub mod audit;
pub mod error;
pub mod import;
pub mod pools;
pub mod redeem;

// Re-export component crates
pub use codepool_core as core;
pub use codepool_store as store;

// Re-export main types for convenience
pub use audit::{PriorOutcome, RequestLedger};
pub use error::{LedgerError, Result};
pub use import::{ImportLedger, ImportOutcome};
pub use pools::{CodePools, LedgerConfig, MAX_ATTEMPTS};
pub use redeem::{RedeemOutcome, RedemptionEngine};

// Re-export commonly used core types
pub use codepool_core::{
    canonicalize, AuditEntry, AuditField, AuditParams, CodeCount, CodeRecord, PoolName,
    RedeemedCode, RejectReason, Rejection,
};
