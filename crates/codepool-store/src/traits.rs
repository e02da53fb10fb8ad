//! Store traits: the abstract interface for pool persistence.
//!
//! [`Store`] owns the pool registry and hands out transactions. Everything
//! scoped to one pool happens through a [`PoolTx`] inside [`Store::transact`],
//! which commits only when the closure returns `Ok`. The ledger engine is
//! written once against `PoolTx` and gets the same atomicity on every backend.

use async_trait::async_trait;
use codepool_core::{
    AuditEntry, AuditField, CodeCount, CodeRecord, ImportAuditEntry, PoolName, UniqueCode,
};

use crate::error::{Result, StoreError};

/// One pool's tables inside one open transaction.
///
/// Methods are synchronous: a transaction never spans an await point.
pub trait PoolTx {
    // ─────────────────────────────────────────────────────────────────────────
    // Codes
    // ─────────────────────────────────────────────────────────────────────────

    /// Find the first code row (lowest id) whose stored code equals `code`.
    ///
    /// Codes are not unique within a pool; later duplicates are shadowed.
    fn find_code(&mut self, code: &str) -> Result<Option<UniqueCode>>;

    /// Mark a code used, iff it is currently unused.
    ///
    /// This is a single conditional write. Returns `true` when this call
    /// performed the transition, `false` when the code was already used.
    fn try_redeem(&mut self, id: i64, reason: &str, now: i64) -> Result<bool>;

    /// Count codes grouped by `(flavour, used)`, ordered by that pair.
    fn count_codes(&mut self) -> Result<Vec<CodeCount>>;

    /// Insert unused codes sharing one `created_at`/`modified_at` stamp.
    ///
    /// Returns the number of rows inserted.
    fn insert_codes(&mut self, rows: &[CodeRecord], now: i64) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Redemption audit log
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the audit entry for a request id.
    fn find_audit(&mut self, request_id: &str) -> Result<Option<AuditEntry>>;

    /// Append an audit entry.
    ///
    /// Fails with [`StoreError::DuplicateRequest`] if the request id is taken.
    fn insert_audit(&mut self, entry: &AuditEntry) -> Result<()>;

    /// All audit entries whose `field` equals `value`, oldest first.
    fn query_audit(&mut self, field: AuditField, value: &str) -> Result<Vec<AuditEntry>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Import audit log
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the import entry for a request id.
    fn find_import(&mut self, request_id: &str) -> Result<Option<ImportAuditEntry>>;

    /// Append an import entry.
    ///
    /// Fails with [`StoreError::DuplicateRequest`] if the request id is taken.
    fn insert_import(&mut self, entry: &ImportAuditEntry) -> Result<()>;
}

/// The Store trait: async interface for pool persistence.
///
/// All state lives in the backing store. Correctness under concurrent callers
/// comes from the store's transactions and conditional writes, never from
/// locks held by the caller.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Pool registry
    // ─────────────────────────────────────────────────────────────────────────

    /// Check whether a pool's namespace has been created.
    async fn pool_exists(&self, pool: &PoolName) -> Result<bool>;

    /// Create a pool's namespace.
    ///
    /// Idempotent: returns `false` and changes nothing if the pool exists.
    async fn create_pool(&self, pool: &PoolName) -> Result<bool>;

    /// List all pools, ordered by name.
    async fn list_pools(&self) -> Result<Vec<PoolName>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────

    /// Run `f` against one pool inside a single transaction.
    ///
    /// - Missing pool: fails with [`StoreError::PoolNotFound`] before `f` runs.
    /// - `f` returns `Ok`: every write it made is committed together.
    /// - `f` returns `Err`: every write it made is rolled back.
    async fn transact<T, E, F>(&self, pool: &PoolName, f: F) -> std::result::Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: FnOnce(&mut dyn PoolTx) -> std::result::Result<T, E> + Send + 'static;
}

/// Convenience reads that need no engine logic.
#[async_trait]
pub trait StoreExt: Store {
    /// Count codes in a pool by `(flavour, used)`.
    async fn count_codes(&self, pool: &PoolName) -> Result<Vec<CodeCount>> {
        self.transact(pool, |tx| tx.count_codes()).await
    }

    /// Query a pool's audit log by one field.
    async fn query_audit(
        &self,
        pool: &PoolName,
        field: AuditField,
        value: &str,
    ) -> Result<Vec<AuditEntry>> {
        let value = value.to_string();
        self.transact(pool, move |tx| tx.query_audit(field, &value)).await
    }
}

impl<S: Store> StoreExt for S {}

/// Map a failed pool lookup into the dedicated error.
pub(crate) fn pool_not_found(pool: &PoolName) -> StoreError {
    StoreError::PoolNotFound(pool.to_string())
}
