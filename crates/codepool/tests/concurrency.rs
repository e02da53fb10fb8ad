//! Concurrent callers against one pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use codepool::core::{AuditEntry, ImportAuditEntry, UniqueCode};
use codepool::store::{MemoryStore, PoolTx, SqliteStore, Store, StoreError};
use codepool::{
    AuditField, AuditParams, CodeCount, CodePools, CodeRecord, LedgerConfig, LedgerError,
    PoolName, RejectReason,
};

type StoreResult<T> = std::result::Result<T, StoreError>;

async fn seed<S: Store>(pools: &CodePools<S>, pool: &PoolName) {
    pools.create_pool(pool).await.unwrap();
    pools
        .import_codes(pool, "req-import", "fp", vec![CodeRecord::new("vanilla", "v0")])
        .await
        .unwrap();
}

fn tally(results: &[Result<codepool::RedeemedCode, LedgerError>]) -> (usize, usize) {
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let used = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(LedgerError::CannotRedeem {
                    reason: RejectReason::Used,
                    ..
                })
            )
        })
        .count();
    (wins, used)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_winner_per_code() {
    let pools = CodePools::new(SqliteStore::open_memory().unwrap(), LedgerConfig::default());
    let pool = PoolName::new("P").unwrap();
    seed(&pools, &pool).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let pools = pools.clone();
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let params = AuditParams::new(format!("req-{i}"), format!("tx-{i}"), "user");
            pools.redeem(&pool, "v0", &params).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    assert_eq!(tally(&results), (1, 7));

    assert_eq!(
        pools.count_codes(&pool).await.unwrap(),
        vec![CodeCount { flavour: "vanilla".into(), used: true, count: 1 }]
    );
    let audit = pools
        .query_audit(&pool, AuditField::UniqueCode, "v0")
        .await
        .unwrap();
    assert_eq!(audit.len(), 8);
    assert_eq!(audit.iter().filter(|e| !e.error).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_winner_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codes.db");

    let first = CodePools::new(SqliteStore::open(&path).unwrap(), LedgerConfig::default());
    let pool = PoolName::new("P").unwrap();
    seed(&first, &pool).await;
    let second = CodePools::new(SqliteStore::open(&path).unwrap(), LedgerConfig::default());

    let a = {
        let (pools, pool) = (first.clone(), pool.clone());
        tokio::spawn(async move {
            pools
                .redeem(&pool, "v0", &AuditParams::new("req-a", "tx-a", "user-a"))
                .await
        })
    };
    let b = {
        let (pools, pool) = (second.clone(), pool.clone());
        tokio::spawn(async move {
            pools
                .redeem(&pool, "v0", &AuditParams::new("req-b", "tx-b", "user-b"))
                .await
        })
    };

    let results = vec![a.await.unwrap(), b.await.unwrap()];
    assert_eq!(tally(&results), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retries_of_one_request() {
    let pools = CodePools::new(SqliteStore::open_memory().unwrap(), LedgerConfig::default());
    let pool = PoolName::new("P").unwrap();
    seed(&pools, &pool).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pools = pools.clone();
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            pools
                .redeem(&pool, "V0", &AuditParams::new("req-0", "tx-0", "user-0"))
                .await
        }));
    }

    let mut codes = Vec::new();
    for handle in handles {
        codes.push(handle.await.unwrap().unwrap());
    }
    assert!(codes.windows(2).all(|w| w[0] == w[1]));

    let audit = pools
        .query_audit(&pool, AuditField::RequestId, "req-0")
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Lost request-id race
// ─────────────────────────────────────────────────────────────────────────────

/// A store whose next transaction misses existing audit entries, as if a
/// concurrent first-time request committed right after the lookup.
struct StaleStore {
    inner: MemoryStore,
    stale: Arc<AtomicBool>,
}

struct StaleTx<'a> {
    inner: &'a mut dyn PoolTx,
    stale: bool,
}

impl PoolTx for StaleTx<'_> {
    fn find_code(&mut self, code: &str) -> StoreResult<Option<UniqueCode>> {
        self.inner.find_code(code)
    }
    fn try_redeem(&mut self, id: i64, reason: &str, now: i64) -> StoreResult<bool> {
        self.inner.try_redeem(id, reason, now)
    }
    fn count_codes(&mut self) -> StoreResult<Vec<CodeCount>> {
        self.inner.count_codes()
    }
    fn insert_codes(&mut self, rows: &[CodeRecord], now: i64) -> StoreResult<usize> {
        self.inner.insert_codes(rows, now)
    }
    fn find_audit(&mut self, request_id: &str) -> StoreResult<Option<AuditEntry>> {
        if self.stale {
            return Ok(None);
        }
        self.inner.find_audit(request_id)
    }
    fn insert_audit(&mut self, entry: &AuditEntry) -> StoreResult<()> {
        self.inner.insert_audit(entry)
    }
    fn query_audit(&mut self, field: AuditField, value: &str) -> StoreResult<Vec<AuditEntry>> {
        self.inner.query_audit(field, value)
    }
    fn find_import(&mut self, request_id: &str) -> StoreResult<Option<ImportAuditEntry>> {
        if self.stale {
            return Ok(None);
        }
        self.inner.find_import(request_id)
    }
    fn insert_import(&mut self, entry: &ImportAuditEntry) -> StoreResult<()> {
        self.inner.insert_import(entry)
    }
}

#[async_trait]
impl Store for StaleStore {
    async fn pool_exists(&self, pool: &PoolName) -> StoreResult<bool> {
        self.inner.pool_exists(pool).await
    }

    async fn create_pool(&self, pool: &PoolName) -> StoreResult<bool> {
        self.inner.create_pool(pool).await
    }

    async fn list_pools(&self) -> StoreResult<Vec<PoolName>> {
        self.inner.list_pools().await
    }

    async fn transact<T, E, F>(&self, pool: &PoolName, f: F) -> std::result::Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: FnOnce(&mut dyn PoolTx) -> std::result::Result<T, E> + Send + 'static,
    {
        let stale = self.stale.swap(false, Ordering::SeqCst);
        self.inner
            .transact(pool, move |tx: &mut dyn PoolTx| {
                let mut tx = StaleTx { inner: tx, stale };
                f(&mut tx)
            })
            .await
    }
}

#[tokio::test]
async fn test_lost_redeem_race_becomes_replay() {
    let store = StaleStore {
        inner: MemoryStore::new(),
        stale: Arc::new(AtomicBool::new(false)),
    };
    let stale = Arc::clone(&store.stale);
    let pools = CodePools::new(store, LedgerConfig::default());
    let pool = PoolName::new("P").unwrap();
    seed(&pools, &pool).await;

    let params = AuditParams::new("req-0", "tx-0", "user-0");
    let first = pools.redeem(&pool, "v0", &params).await.unwrap();

    // The first attempt misses the entry, runs, and collides on insert; the
    // second attempt sees the entry and replays it.
    stale.store(true, Ordering::SeqCst);
    let second = pools.redeem(&pool, "v0", &params).await.unwrap();
    assert_eq!(second, first);
    assert!(!stale.load(Ordering::SeqCst));

    let audit = pools
        .query_audit(&pool, AuditField::RequestId, "req-0")
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].error);
}

#[tokio::test]
async fn test_lost_import_race_becomes_noop() {
    let store = StaleStore {
        inner: MemoryStore::new(),
        stale: Arc::new(AtomicBool::new(false)),
    };
    let stale = Arc::clone(&store.stale);
    let pools = CodePools::new(store, LedgerConfig::default());
    let pool = PoolName::new("P").unwrap();
    seed(&pools, &pool).await;

    stale.store(true, Ordering::SeqCst);
    let outcome = pools
        .import_codes(&pool, "req-import", "fp", vec![CodeRecord::new("vanilla", "v0")])
        .await
        .unwrap();
    assert_eq!(outcome, codepool::ImportOutcome::AlreadyImported);
    assert_eq!(pools.count_codes(&pool).await.unwrap()[0].count, 1);
}
