//! # Codepool Store
//!
//! Storage for unique code pools. Provides a trait-based interface with
//! SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The [`Store`] trait is the pool registry plus a transaction entry point.
//! Everything scoped to one pool (codes, the redemption audit log, the import
//! audit log) is reached through a [`PoolTx`] handed to [`Store::transact`].
//! The primary implementation is [`SqliteStore`], with [`MemoryStore`] for
//! testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for registry operations and transactions
//! - [`PoolTx`] - Synchronous operations on one pool inside a transaction
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use codepool_core::{CodeRecord, PoolName};
//! use codepool_store::{SqliteStore, Store, StoreError};
//!
//! async fn example() -> Result<(), StoreError> {
//!     let store = SqliteStore::open("codes.db")?;
//!     let pool = PoolName::new("vouchers").unwrap();
//!     store.create_pool(&pool).await?;
//!
//!     store
//!         .transact(&pool, |tx| tx.insert_codes(&[CodeRecord::new("vanilla", "v0")], 0))
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **One schema, many pools**: pool-scoped rows carry a `pool_id`; the
//!   `pools` table is the namespace registry
//! - **Atomic redemption**: `try_redeem` is one conditional `UPDATE`
//! - **Unique request ids**: duplicate audit inserts fail with
//!   [`StoreError::DuplicateRequest`] instead of writing a second row
//! - **Duplicate codes**: codes are not unique; lookups return the lowest id

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{PoolTx, Store, StoreExt};
