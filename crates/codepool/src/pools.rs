//! CodePools: the async API over a [`Store`].
//!
//! Each pool-scoped call opens one store transaction and runs the matching
//! ledger inside it. A call that loses a request-id race to a concurrent
//! first-time request is run once more, which turns it into a replay.

use std::sync::Arc;

use tracing::{debug, info};

use codepool_core::{
    canonicalize, now_millis, AuditEntry, AuditField, AuditParams, CodeCount, CodeRecord,
    PoolName, RedeemedCode,
};
use codepool_store::{PoolTx, Store, StoreError, StoreExt};

use crate::audit::RequestLedger;
use crate::error::{LedgerError, Result};
use crate::import::{ImportLedger, ImportOutcome};
use crate::redeem::RedemptionEngine;

/// Attempts per call: the first run plus one replay after a lost
/// request-id race.
pub const MAX_ATTEMPTS: u32 = 2;

/// Configuration for [`CodePools`].
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Canonicalize imported codes before storing them.
    ///
    /// Off by default: imports are stored verbatim, so a code that does not
    /// survive canonicalization unchanged can never be redeemed.
    pub canonicalize_imports: bool,
    /// Reason written to a code row when it is redeemed.
    pub redeem_reason: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            canonicalize_imports: false,
            redeem_reason: "redeemed".to_string(),
        }
    }
}

/// The ledger over every pool in one store.
///
/// Cheap to clone; clones share the store.
pub struct CodePools<S: Store> {
    store: Arc<S>,
    config: Arc<LedgerConfig>,
}

impl<S: Store> Clone for CodePools<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: Store> CodePools<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pool registry
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn pool_exists(&self, pool: &PoolName) -> Result<bool> {
        Ok(self.store.pool_exists(pool).await?)
    }

    /// Create a pool. Returns `false` if it already existed.
    pub async fn create_pool(&self, pool: &PoolName) -> Result<bool> {
        let created = self.store.create_pool(pool).await?;
        if created {
            info!(%pool, "pool created");
        }
        Ok(created)
    }

    pub async fn list_pools(&self) -> Result<Vec<PoolName>> {
        Ok(self.store.list_pools().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Imports
    // ─────────────────────────────────────────────────────────────────────────

    /// Import a batch of codes exactly once per request id.
    pub async fn import_codes(
        &self,
        pool: &PoolName,
        request_id: &str,
        content_fingerprint: &str,
        rows: Vec<CodeRecord>,
    ) -> Result<ImportOutcome> {
        let rows: Arc<[CodeRecord]> = if self.config.canonicalize_imports {
            rows.into_iter()
                .map(|r| CodeRecord {
                    unique_code: canonicalize(&r.unique_code),
                    ..r
                })
                .collect()
        } else {
            rows.into()
        };
        let request_id = request_id.to_string();
        let fingerprint = content_fingerprint.to_string();

        let outcome = self
            .transact_idempotent(pool, move |tx| {
                ImportLedger::new(tx).import_batch(&request_id, &fingerprint, &rows, now_millis())
            })
            .await?;

        if let ImportOutcome::Imported { rows } = outcome {
            info!(%pool, rows, "codes imported");
        }
        Ok(outcome)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Redemption
    // ─────────────────────────────────────────────────────────────────────────

    /// Redeem a code, or replay the recorded outcome of `params.request_id`.
    ///
    /// A rejected code surfaces as [`LedgerError::CannotRedeem`], for the
    /// first attempt and for every replay of it.
    pub async fn redeem(
        &self,
        pool: &PoolName,
        candidate_code: &str,
        params: &AuditParams,
    ) -> Result<RedeemedCode> {
        let config = Arc::clone(&self.config);
        let params = params.clone();
        let candidate_code = candidate_code.to_string();

        let outcome = self
            .transact_idempotent(pool, move |tx| {
                RedemptionEngine::new(tx, &config.redeem_reason).redeem(
                    &params,
                    &candidate_code,
                    now_millis(),
                )
            })
            .await?;

        if outcome.is_replay() {
            debug!(%pool, "redemption replayed");
        }
        outcome.into_result()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Code counts by `(flavour, used)`.
    pub async fn count_codes(&self, pool: &PoolName) -> Result<Vec<CodeCount>> {
        Ok(StoreExt::count_codes(self.store.as_ref(), pool).await?)
    }

    /// Audit entries whose `field` equals `value`, oldest first.
    pub async fn query_audit(
        &self,
        pool: &PoolName,
        field: AuditField,
        value: &str,
    ) -> Result<Vec<AuditEntry>> {
        let value = value.to_string();
        self.store
            .transact(pool, move |tx| RequestLedger::new(tx).query(field, &value))
            .await
    }

    /// Run `f` in a transaction, once more if a concurrent request with the
    /// same id committed first.
    async fn transact_idempotent<T, F>(&self, pool: &PoolName, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&mut dyn PoolTx) -> Result<T> + Clone + Send + 'static,
    {
        let mut attempt = 1;
        loop {
            match self.store.transact(pool, f.clone()).await {
                Err(LedgerError::Store(StoreError::DuplicateRequest(request_id)))
                    if attempt < MAX_ATTEMPTS =>
                {
                    debug!(%request_id, attempt, "lost request id race, retrying as replay");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
