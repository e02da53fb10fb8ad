//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use codepool_core::{
    AuditEntry, AuditField, CodeCount, CodeRecord, ImportAuditEntry, PoolName, UniqueCode,
};

use crate::error::{Result, StoreError};
use crate::traits::{pool_not_found, PoolTx, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
/// A transaction writes in place and keeps an undo log, replayed if the
/// closure fails, so a failed transaction leaves no trace.
pub struct MemoryStore {
    inner: RwLock<BTreeMap<PoolName, PoolData>>,
}

#[derive(Default)]
struct PoolData {
    /// Codes in insertion (= id) order.
    codes: Vec<UniqueCode>,

    /// Next surrogate id to hand out.
    next_code_id: i64,

    /// Redemption audit log, append order.
    audit: Vec<AuditEntry>,

    /// Import audit log, append order.
    imports: Vec<ImportAuditEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Poisoned(format!("rwlock poisoned: {}", e))
}

impl PoolTx for PoolData {
    fn find_code(&mut self, code: &str) -> Result<Option<UniqueCode>> {
        Ok(self.codes.iter().find(|c| c.unique_code == code).cloned())
    }

    fn try_redeem(&mut self, id: i64, reason: &str, now: i64) -> Result<bool> {
        match self.codes.iter_mut().find(|c| c.id == id) {
            Some(code) if !code.used => {
                code.used = true;
                code.reason = Some(reason.to_string());
                code.modified_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn count_codes(&mut self) -> Result<Vec<CodeCount>> {
        let mut groups: BTreeMap<(String, bool), u64> = BTreeMap::new();
        for code in &self.codes {
            *groups.entry((code.flavour.clone(), code.used)).or_default() += 1;
        }
        Ok(groups
            .into_iter()
            .map(|((flavour, used), count)| CodeCount {
                flavour,
                used,
                count,
            })
            .collect())
    }

    fn insert_codes(&mut self, rows: &[CodeRecord], now: i64) -> Result<usize> {
        for row in rows {
            self.next_code_id += 1;
            self.codes.push(UniqueCode {
                id: self.next_code_id,
                unique_code: row.unique_code.clone(),
                flavour: row.flavour.clone(),
                used: false,
                created_at: now,
                modified_at: now,
                reason: None,
            });
        }
        Ok(rows.len())
    }

    fn find_audit(&mut self, request_id: &str) -> Result<Option<AuditEntry>> {
        Ok(self
            .audit
            .iter()
            .find(|e| e.request_id == request_id)
            .cloned())
    }

    fn insert_audit(&mut self, entry: &AuditEntry) -> Result<()> {
        if self.audit.iter().any(|e| e.request_id == entry.request_id) {
            return Err(StoreError::DuplicateRequest(entry.request_id.clone()));
        }
        self.audit.push(entry.clone());
        Ok(())
    }

    fn query_audit(&mut self, field: AuditField, value: &str) -> Result<Vec<AuditEntry>> {
        let mut entries: Vec<AuditEntry> = self
            .audit
            .iter()
            .filter(|e| field.value_of(e) == Some(value))
            .cloned()
            .collect();
        // Stable: ties keep append order, like ORDER BY created_at, id.
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    fn find_import(&mut self, request_id: &str) -> Result<Option<ImportAuditEntry>> {
        Ok(self
            .imports
            .iter()
            .find(|e| e.request_id == request_id)
            .cloned())
    }

    fn insert_import(&mut self, entry: &ImportAuditEntry) -> Result<()> {
        if self.imports.iter().any(|e| e.request_id == entry.request_id) {
            return Err(StoreError::DuplicateRequest(entry.request_id.clone()));
        }
        self.imports.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn pool_exists(&self, pool: &PoolName) -> Result<bool> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.contains_key(pool))
    }

    async fn create_pool(&self, pool: &PoolName) -> Result<bool> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if inner.contains_key(pool) {
            return Ok(false);
        }
        inner.insert(pool.clone(), PoolData::default());
        tracing::trace!(%pool, "memory pool created");
        Ok(true)
    }

    async fn list_pools(&self) -> Result<Vec<PoolName>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.keys().cloned().collect())
    }

    async fn transact<T, E, F>(&self, pool: &PoolName, f: F) -> std::result::Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: FnOnce(&mut dyn PoolTx) -> std::result::Result<T, E> + Send + 'static,
    {
        // The write lock serializes transactions, standing in for SQLite's
        // database lock.
        let mut inner = self.inner.write().map_err(poisoned)?;
        let data = inner.get_mut(pool).ok_or_else(|| pool_not_found(pool))?;

        let mut tx = MemoryTx::begin(data);
        match f(&mut tx) {
            Ok(value) => Ok(value),
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }
}

/// An open transaction on one pool.
///
/// Codes, audit rows and imports are only appended, and a code only flips
/// from unused to used, so the starting lengths plus the prior state of each
/// redeemed row are enough to undo it.
struct MemoryTx<'a> {
    data: &'a mut PoolData,
    codes_len: usize,
    next_code_id: i64,
    audit_len: usize,
    imports_len: usize,
    redeemed: Vec<UniqueCode>,
}

impl<'a> MemoryTx<'a> {
    fn begin(data: &'a mut PoolData) -> Self {
        Self {
            codes_len: data.codes.len(),
            next_code_id: data.next_code_id,
            audit_len: data.audit.len(),
            imports_len: data.imports.len(),
            redeemed: Vec::new(),
            data,
        }
    }

    fn rollback(self) {
        let data = self.data;
        for prior in self.redeemed.into_iter().rev() {
            if let Some(code) = data.codes.iter_mut().find(|c| c.id == prior.id) {
                *code = prior;
            }
        }
        data.codes.truncate(self.codes_len);
        data.next_code_id = self.next_code_id;
        data.audit.truncate(self.audit_len);
        data.imports.truncate(self.imports_len);
    }
}

impl PoolTx for MemoryTx<'_> {
    fn find_code(&mut self, code: &str) -> Result<Option<UniqueCode>> {
        self.data.find_code(code)
    }

    fn try_redeem(&mut self, id: i64, reason: &str, now: i64) -> Result<bool> {
        let prior = self.data.codes.iter().find(|c| c.id == id && !c.used).cloned();
        let redeemed = self.data.try_redeem(id, reason, now)?;
        if let (true, Some(prior)) = (redeemed, prior) {
            self.redeemed.push(prior);
        }
        Ok(redeemed)
    }

    fn count_codes(&mut self) -> Result<Vec<CodeCount>> {
        self.data.count_codes()
    }

    fn insert_codes(&mut self, rows: &[CodeRecord], now: i64) -> Result<usize> {
        self.data.insert_codes(rows, now)
    }

    fn find_audit(&mut self, request_id: &str) -> Result<Option<AuditEntry>> {
        self.data.find_audit(request_id)
    }

    fn insert_audit(&mut self, entry: &AuditEntry) -> Result<()> {
        self.data.insert_audit(entry)
    }

    fn query_audit(&mut self, field: AuditField, value: &str) -> Result<Vec<AuditEntry>> {
        self.data.query_audit(field, value)
    }

    fn find_import(&mut self, request_id: &str) -> Result<Option<ImportAuditEntry>> {
        self.data.find_import(request_id)
    }

    fn insert_import(&mut self, entry: &ImportAuditEntry) -> Result<()> {
        self.data.insert_import(entry)
    }
}
