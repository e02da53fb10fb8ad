//! # Codepool Testkit
//!
//! Testing utilities for codepool.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Raw codes and their expected canonical forms
//! - **Generators**: Proptest strategies for codes, batches and identities
//! - **Fixtures**: A ready-made pool in a memory store
//!
//! ## Golden Vectors
//!
//! ```rust
//! use codepool_testkit::vectors::{all_vectors, verify_all_vectors};
//!
//! assert!(!all_vectors().is_empty());
//! verify_all_vectors().unwrap();
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use codepool_testkit::generators::DecoratedCode;
//!
//! proptest! {
//!     #[test]
//!     fn decorated_codes_resolve(code: DecoratedCode) {
//!         prop_assert_eq!(codepool::canonicalize(&code.decorated), code.canonical);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use codepool_testkit::fixtures::TestPool;
//!
//! let fixture = TestPool::new("summer").await?;
//! fixture.import(&[("vanilla", "v0")]).await?;
//! let code = fixture.redeem("V-0", "req-1").await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{audit_params, fingerprint, multi_pool_fixtures, random_request_id, TestPool};
pub use generators::DecoratedCode;
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
