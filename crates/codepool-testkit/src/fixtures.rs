//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use rand::distributions::Alphanumeric;
use rand::Rng;

use codepool::{CodePools, ImportOutcome, LedgerConfig, RedeemedCode, Result};
use codepool_core::{AuditParams, CodeRecord, PoolName};
use codepool_store::MemoryStore;

/// A created pool backed by a memory store.
pub struct TestPool {
    pub pools: CodePools<MemoryStore>,
    pub pool: PoolName,
}

impl TestPool {
    /// Create an empty pool named `name` in a fresh memory store.
    pub async fn new(name: &str) -> Result<Self> {
        Self::with_config(name, LedgerConfig::default()).await
    }

    pub async fn with_config(name: &str, config: LedgerConfig) -> Result<Self> {
        let pools = CodePools::new(MemoryStore::new(), config);
        let pool = PoolName::new(name)?;
        pools.create_pool(&pool).await?;
        Ok(Self { pools, pool })
    }

    /// Import `(flavour, code)` pairs under a random request id.
    pub async fn import(&self, rows: &[(&str, &str)]) -> Result<ImportOutcome> {
        let rows: Vec<CodeRecord> = rows
            .iter()
            .map(|(flavour, code)| CodeRecord::new(*flavour, *code))
            .collect();
        let fingerprint = fingerprint(&rows);
        self.pools
            .import_codes(&self.pool, &random_request_id(), &fingerprint, rows)
            .await
    }

    /// Redeem `code` with the identity [`audit_params`] derives from
    /// `request_id`.
    pub async fn redeem(&self, code: &str, request_id: &str) -> Result<RedeemedCode> {
        self.pools
            .redeem(&self.pool, code, &audit_params(request_id))
            .await
    }
}

/// A deterministic identity for a request id: `tx-{id}` / `user-tx-{id}`.
pub fn audit_params(request_id: &str) -> AuditParams {
    let transaction_id = format!("tx-{}", request_id);
    let user_id = format!("user-{}", transaction_id);
    AuditParams::new(request_id, transaction_id, user_id)
}

/// A fresh 16-character alphanumeric request id.
pub fn random_request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Content fingerprint of a batch: BLAKE3 over its JSON encoding, hex.
pub fn fingerprint(rows: &[CodeRecord]) -> String {
    let mut hasher = blake3::Hasher::new();
    for row in rows {
        // CodeRecord is two strings; encoding cannot fail.
        let line = serde_json::to_vec(row).unwrap_or_default();
        hasher.update(&line);
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// `count` fresh pools named `pool-0`, `pool-1`, ... sharing one store.
pub async fn multi_pool_fixtures(count: usize) -> Result<(CodePools<MemoryStore>, Vec<PoolName>)> {
    let pools = CodePools::new(MemoryStore::new(), LedgerConfig::default());
    let mut names = Vec::with_capacity(count);
    for i in 0..count {
        let name = PoolName::new(format!("pool-{}", i))?;
        pools.create_pool(&name).await?;
        names.push(name);
    }
    Ok((pools, names))
}
