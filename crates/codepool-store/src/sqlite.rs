//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, OptionalExtension, TransactionBehavior};

use codepool_core::{
    now_millis, AuditEntry, AuditField, CodeCount, CodeRecord, ImportAuditEntry, PoolName,
    UniqueCode,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{pool_not_found, PoolTx, Store};

/// How long a writer waits on another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the connection in the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = lock_conn(&conn)?;
            f(&mut conn)
        })
        .await
        .map_err(join_error)?
    }
}

fn lock_conn(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::Poisoned(format!("mutex poisoned: {}", e)))
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Task(format!("spawn_blocking failed: {}", e))
}

fn find_pool_id(conn: &Connection, pool: &PoolName) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM pools WHERE name = ?1",
        params![pool.as_str()],
        |row| row.get(0),
    )
    .optional()
    .map_err(StoreError::from)
}

/// Translate a unique-constraint failure into `DuplicateRequest`. Other
/// constraint failures stay database errors.
fn map_duplicate(err: rusqlite::Error, request_id: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::DuplicateRequest(request_id.to_string())
        }
        other => StoreError::Database(other),
    }
}

// Helper to convert a row to UniqueCode
fn row_to_code(row: &rusqlite::Row<'_>) -> rusqlite::Result<UniqueCode> {
    Ok(UniqueCode {
        id: row.get("id")?,
        unique_code: row.get("unique_code")?,
        flavour: row.get("flavour")?,
        used: row.get("used")?,
        created_at: row.get("created_at")?,
        modified_at: row.get("modified_at")?,
        reason: row.get("reason")?,
    })
}

// Helper to parse a JSON text column
fn json_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const AUDIT_COLUMNS: &str = "request_id, transaction_id, user_id, request_data, response_data,
                             error, created_at, unique_code";

// Helper to convert a row (selected with AUDIT_COLUMNS) to AuditEntry
fn row_to_audit(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        request_id: row.get(0)?,
        transaction_id: row.get(1)?,
        user_id: row.get(2)?,
        request_data: json_column(row, 3)?,
        response_data: json_column(row, 4)?,
        error: row.get(5)?,
        created_at: row.get(6)?,
        unique_code: row.get(7)?,
    })
}

/// One pool inside an open SQLite transaction.
struct SqliteTx<'a> {
    conn: &'a Connection,
    pool_id: i64,
}

impl PoolTx for SqliteTx<'_> {
    fn find_code(&mut self, code: &str) -> Result<Option<UniqueCode>> {
        self.conn
            .query_row(
                "SELECT id, unique_code, flavour, used, created_at, modified_at, reason
                 FROM unique_codes WHERE pool_id = ?1 AND unique_code = ?2
                 ORDER BY id LIMIT 1",
                params![self.pool_id, code],
                row_to_code,
            )
            .optional()
            .map_err(StoreError::from)
    }

    fn try_redeem(&mut self, id: i64, reason: &str, now: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE unique_codes SET used = 1, reason = ?1, modified_at = ?2
             WHERE pool_id = ?3 AND id = ?4 AND used = 0",
            params![reason, now, self.pool_id, id],
        )?;
        Ok(changed == 1)
    }

    fn count_codes(&mut self) -> Result<Vec<CodeCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT flavour, used, COUNT(*) FROM unique_codes
             WHERE pool_id = ?1
             GROUP BY flavour, used
             ORDER BY flavour, used",
        )?;

        let counts = stmt
            .query_map(params![self.pool_id], |row| {
                let count: i64 = row.get(2)?;
                Ok(CodeCount {
                    flavour: row.get(0)?,
                    used: row.get(1)?,
                    count: count as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(counts)
    }

    fn insert_codes(&mut self, rows: &[CodeRecord], now: i64) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO unique_codes (pool_id, unique_code, flavour, used, created_at, modified_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
        )?;
        for row in rows {
            stmt.execute(params![self.pool_id, row.unique_code, row.flavour, now])?;
        }
        Ok(rows.len())
    }

    fn find_audit(&mut self, request_id: &str) -> Result<Option<AuditEntry>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM audit WHERE pool_id = ?1 AND request_id = ?2",
                    AUDIT_COLUMNS
                ),
                params![self.pool_id, request_id],
                row_to_audit,
            )
            .optional()
            .map_err(StoreError::from)
    }

    fn insert_audit(&mut self, entry: &AuditEntry) -> Result<()> {
        let request_data = serde_json::to_string(&entry.request_data)?;
        let response_data = serde_json::to_string(&entry.response_data)?;
        self.conn
            .execute(
                "INSERT INTO audit (
                    pool_id, request_id, transaction_id, user_id, request_data,
                    response_data, error, created_at, unique_code
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    self.pool_id,
                    entry.request_id,
                    entry.transaction_id,
                    entry.user_id,
                    request_data,
                    response_data,
                    entry.error,
                    entry.created_at,
                    entry.unique_code,
                ],
            )
            .map_err(|e| map_duplicate(e, &entry.request_id))?;
        Ok(())
    }

    fn query_audit(&mut self, field: AuditField, value: &str) -> Result<Vec<AuditEntry>> {
        // Column names come from a closed enum, never from the caller.
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM audit WHERE pool_id = ?1 AND {} = ?2 ORDER BY created_at, id",
            AUDIT_COLUMNS,
            field.as_str()
        ))?;

        let entries = stmt
            .query_map(params![self.pool_id, value], row_to_audit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn find_import(&mut self, request_id: &str) -> Result<Option<ImportAuditEntry>> {
        self.conn
            .query_row(
                "SELECT request_id, content_fingerprint, created_at
                 FROM import_audit WHERE pool_id = ?1 AND request_id = ?2",
                params![self.pool_id, request_id],
                |row| {
                    Ok(ImportAuditEntry {
                        request_id: row.get(0)?,
                        content_fingerprint: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
    }

    fn insert_import(&mut self, entry: &ImportAuditEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO import_audit (pool_id, request_id, content_fingerprint, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    self.pool_id,
                    entry.request_id,
                    entry.content_fingerprint,
                    entry.created_at,
                ],
            )
            .map_err(|e| map_duplicate(e, &entry.request_id))?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn pool_exists(&self, pool: &PoolName) -> Result<bool> {
        let pool = pool.clone();
        self.with_conn(move |conn| Ok(find_pool_id(conn, &pool)?.is_some()))
            .await
    }

    async fn create_pool(&self, pool: &PoolName) -> Result<bool> {
        let pool = pool.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "INSERT INTO pools (name, created_at) VALUES (?1, ?2)
                 ON CONFLICT(name) DO NOTHING",
                params![pool.as_str(), now_millis()],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn list_pools(&self) -> Result<Vec<PoolName>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM pools ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            names
                .into_iter()
                .map(|name| {
                    PoolName::new(name).map_err(|e| StoreError::InvalidData(e.to_string()))
                })
                .collect()
        })
        .await
    }

    async fn transact<T, E, F>(&self, pool: &PoolName, f: F) -> std::result::Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: FnOnce(&mut dyn PoolTx) -> std::result::Result<T, E> + Send + 'static,
    {
        let pool = pool.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = lock_conn(&conn)?;

            // IMMEDIATE takes the write lock up front, so a read-then-write
            // sequence inside `f` cannot interleave with another writer.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StoreError::from)?;

            let pool_id = find_pool_id(&tx, &pool)?.ok_or_else(|| pool_not_found(&pool))?;

            let mut pool_tx = SqliteTx {
                conn: &tx,
                pool_id,
            };
            let value = f(&mut pool_tx)?;

            tx.commit().map_err(StoreError::from)?;
            Ok(value)
        })
        .await
        .map_err(|e| E::from(join_error(e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;
    use serde_json::json;

    fn pool(name: &str) -> PoolName {
        PoolName::new(name).unwrap()
    }

    fn audit_entry(request_id: &str, tx: &str, user: &str, code: &str, at: i64) -> AuditEntry {
        AuditEntry {
            request_id: request_id.into(),
            transaction_id: tx.into(),
            user_id: user.into(),
            request_data: json!({"candidate_code": code}),
            response_data: json!("resp"),
            error: false,
            created_at: at,
            unique_code: Some(code.into()),
        }
    }

    fn sqlite_failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn test_only_unique_violations_are_duplicates() {
        let dup = map_duplicate(sqlite_failure(ffi::SQLITE_CONSTRAINT_UNIQUE), "req-1");
        assert!(matches!(dup, StoreError::DuplicateRequest(ref id) if id == "req-1"));

        for code in [
            ffi::SQLITE_CONSTRAINT_NOTNULL,
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
            ffi::SQLITE_CONSTRAINT_CHECK,
        ] {
            let err = map_duplicate(sqlite_failure(code), "req-1");
            assert!(matches!(err, StoreError::Database(_)), "code {code} mapped to {err:?}");
        }
    }

    async fn store_with_pool(name: &str) -> (SqliteStore, PoolName) {
        let store = SqliteStore::open_memory().unwrap();
        let pool = pool(name);
        assert!(store.create_pool(&pool).await.unwrap());
        (store, pool)
    }

    #[tokio::test]
    async fn test_create_pool_idempotent() {
        let store = SqliteStore::open_memory().unwrap();
        let p = pool("testpool");

        assert!(!store.pool_exists(&p).await.unwrap());
        assert!(store.create_pool(&p).await.unwrap());
        assert!(store.pool_exists(&p).await.unwrap());
        assert!(!store.create_pool(&p).await.unwrap());
        assert_eq!(store.list_pools().await.unwrap(), vec![p]);
    }

    #[tokio::test]
    async fn test_missing_pool() {
        let store = SqliteStore::open_memory().unwrap();
        let err = store.count_codes(&pool("nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::PoolNotFound(ref name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_insert_and_find_codes() {
        let (store, p) = store_with_pool("testpool").await;

        let inserted = store
            .transact(&p, |tx| {
                tx.insert_codes(
                    &[
                        CodeRecord::new("vanilla", "v0"),
                        CodeRecord::new("vanilla", "v1"),
                        CodeRecord::new("chocolate", "c0"),
                    ],
                    1000,
                )
            })
            .await
            .unwrap();
        assert_eq!(inserted, 3);

        let found = store
            .transact(&p, |tx| tx.find_code("v1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.unique_code, "v1");
        assert_eq!(found.flavour, "vanilla");
        assert!(!found.used);
        assert_eq!(found.created_at, 1000);
        assert_eq!(found.modified_at, 1000);
        assert_eq!(found.reason, None);

        let missing = store.transact(&p, |tx| tx.find_code("zz")).await.unwrap();
        assert!(missing.is_none());

        let counts = store.count_codes(&p).await.unwrap();
        assert_eq!(
            counts,
            vec![
                CodeCount { flavour: "chocolate".into(), used: false, count: 1 },
                CodeCount { flavour: "vanilla".into(), used: false, count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_codes_first_match() {
        let (store, p) = store_with_pool("testpool").await;
        store
            .transact(&p, |tx| {
                tx.insert_codes(
                    &[CodeRecord::new("vanilla", "dup"), CodeRecord::new("chocolate", "dup")],
                    1,
                )
            })
            .await
            .unwrap();

        let found = store
            .transact(&p, |tx| tx.find_code("dup"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.flavour, "vanilla");
    }

    #[tokio::test]
    async fn test_try_redeem_once() {
        let (store, p) = store_with_pool("testpool").await;
        store
            .transact(&p, |tx| tx.insert_codes(&[CodeRecord::new("vanilla", "v0")], 1))
            .await
            .unwrap();

        let (first, second, row) = store
            .transact(&p, |tx| {
                let id = tx.find_code("v0")?.map(|c| c.id).unwrap_or_default();
                let first = tx.try_redeem(id, "redeemed", 2)?;
                let second = tx.try_redeem(id, "redeemed", 3)?;
                let row = tx.find_code("v0")?;
                Ok::<_, StoreError>((first, second, row))
            })
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        let row = row.unwrap();
        assert!(row.used);
        assert_eq!(row.reason.as_deref(), Some("redeemed"));
        assert_eq!(row.modified_at, 2);
        assert_eq!(row.created_at, 1);
    }

    #[tokio::test]
    async fn test_rollback_on_error() {
        let (store, p) = store_with_pool("testpool").await;

        let result: std::result::Result<(), StoreError> = store
            .transact(&p, |tx| {
                tx.insert_codes(&[CodeRecord::new("vanilla", "v0")], 1)?;
                Err(StoreError::InvalidData("abort".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(store.count_codes(&p).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_insert_and_duplicate() {
        let (store, p) = store_with_pool("testpool").await;
        let entry = audit_entry("req-0", "tx-0", "user-0", "v0", 10);

        let inserted = entry.clone();
        store
            .transact(&p, move |tx| tx.insert_audit(&inserted))
            .await
            .unwrap();

        let found = store
            .transact(&p, |tx| tx.find_audit("req-0"))
            .await
            .unwrap();
        assert_eq!(found, Some(entry.clone()));

        let again = entry.clone();
        let err = store
            .transact(&p, move |tx| tx.insert_audit(&again))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRequest(ref id) if id == "req-0"));
    }

    #[tokio::test]
    async fn test_query_audit_ordered() {
        let (store, p) = store_with_pool("testpool").await;
        let entries = vec![
            audit_entry("req-1", "tx-0", "user-0", "v1", 20),
            audit_entry("req-0", "tx-0", "user-0", "v0", 10),
            audit_entry("req-excl", "tx-excl", "user-excl", "excl", 15),
        ];
        store
            .transact(&p, move |tx| {
                for entry in &entries {
                    tx.insert_audit(entry)?;
                }
                Ok::<_, StoreError>(())
            })
            .await
            .unwrap();

        let by_tx = store
            .query_audit(&p, AuditField::TransactionId, "tx-0")
            .await
            .unwrap();
        let ids: Vec<_> = by_tx.iter().map(|e| e.request_id.as_str()).collect();
        assert_eq!(ids, vec!["req-0", "req-1"]);

        let by_code = store
            .query_audit(&p, AuditField::UniqueCode, "v1")
            .await
            .unwrap();
        assert_eq!(by_code.len(), 1);
        assert_eq!(by_code[0].request_id, "req-1");

        let none = store
            .query_audit(&p, AuditField::UserId, "user-1")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_import_audit() {
        let (store, p) = store_with_pool("testpool").await;
        let entry = ImportAuditEntry {
            request_id: "req-0".into(),
            content_fingerprint: "md5-0".into(),
            created_at: 5,
        };

        let inserted = entry.clone();
        store
            .transact(&p, move |tx| tx.insert_import(&inserted))
            .await
            .unwrap();
        let found = store
            .transact(&p, |tx| tx.find_import("req-0"))
            .await
            .unwrap();
        assert_eq!(found, Some(entry.clone()));

        let err = store
            .transact(&p, move |tx| tx.insert_import(&entry))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRequest(_)));
    }

    #[tokio::test]
    async fn test_pools_isolated() {
        let store = SqliteStore::open_memory().unwrap();
        let a = pool("a");
        let b = pool("b");
        store.create_pool(&a).await.unwrap();
        store.create_pool(&b).await.unwrap();

        store
            .transact(&a, |tx| tx.insert_codes(&[CodeRecord::new("vanilla", "v0")], 1))
            .await
            .unwrap();
        let entry = audit_entry("req-0", "tx-0", "user-0", "v0", 1);
        let in_b = entry.clone();
        store
            .transact(&a, move |tx| tx.insert_audit(&entry))
            .await
            .unwrap();
        // Same request id is free in another pool.
        store
            .transact(&b, move |tx| tx.insert_audit(&in_b))
            .await
            .unwrap();

        assert_eq!(store.count_codes(&a).await.unwrap().len(), 1);
        assert!(store.count_codes(&b).await.unwrap().is_empty());
        assert!(store
            .transact(&b, |tx| tx.find_code("v0"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.db");
        let p = pool("testpool");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_pool(&p).await.unwrap();
            store
                .transact(&p, |tx| tx.insert_codes(&[CodeRecord::new("vanilla", "v0")], 1))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.pool_exists(&p).await.unwrap());
        assert_eq!(
            store.count_codes(&p).await.unwrap(),
            vec![CodeCount { flavour: "vanilla".into(), used: false, count: 1 }]
        );
    }
}
