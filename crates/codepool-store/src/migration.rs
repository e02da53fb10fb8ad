//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.
//!
//! All pools share one schema; every pool-scoped row carries a `pool_id`
//! pointing into the `pools` registry table.

use rusqlite::Connection;

use codepool_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Pool registry: a pool exists iff it has a row here
        CREATE TABLE pools (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );

        -- Codes; unique_code is deliberately not unique within a pool
        CREATE TABLE unique_codes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pool_id INTEGER NOT NULL REFERENCES pools(id),
            unique_code TEXT NOT NULL,
            flavour TEXT NOT NULL,
            used INTEGER NOT NULL DEFAULT 0,   -- 0=available, 1=redeemed
            created_at INTEGER NOT NULL,
            modified_at INTEGER NOT NULL,
            reason TEXT
        );

        -- Redemption audit log, append-only
        CREATE TABLE audit (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pool_id INTEGER NOT NULL REFERENCES pools(id),
            request_id TEXT NOT NULL,
            transaction_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            request_data TEXT NOT NULL,        -- JSON
            response_data TEXT NOT NULL,       -- JSON
            error INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            unique_code TEXT,

            UNIQUE(pool_id, request_id)
        );

        -- Import audit log, append-only
        CREATE TABLE import_audit (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pool_id INTEGER NOT NULL REFERENCES pools(id),
            request_id TEXT NOT NULL,
            content_fingerprint TEXT NOT NULL,
            created_at INTEGER NOT NULL,

            UNIQUE(pool_id, request_id)
        );

        -- Indexes for common queries
        CREATE INDEX idx_codes_pool_code ON unique_codes(pool_id, unique_code);
        CREATE INDEX idx_codes_pool_flavour_used ON unique_codes(pool_id, flavour, used);
        CREATE INDEX idx_audit_pool_transaction ON audit(pool_id, transaction_id);
        CREATE INDEX idx_audit_pool_user ON audit(pool_id, user_id);
        CREATE INDEX idx_audit_pool_code ON audit(pool_id, unique_code);
        CREATE INDEX idx_audit_pool_created ON audit(pool_id, created_at);
        "#,
    )?;

    Ok(())
}
