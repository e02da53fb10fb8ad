//! ImportLedger: exactly-once bulk imports.
//!
//! An import is identified by its request id and described by a content
//! fingerprint. The import entry and the code rows are written in the same
//! transaction, so a batch is either fully present or absent.

use tracing::{debug, warn};

use codepool_core::{CodeRecord, ImportAuditEntry};
use codepool_store::PoolTx;

use crate::error::{LedgerError, Result};

/// Result of one call to [`ImportLedger::import_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// First sighting of the request id; `rows` codes were inserted.
    Imported { rows: usize },
    /// The same request id and fingerprint were imported before. Nothing
    /// was written.
    AlreadyImported,
}

/// The import log of one pool, viewed through an open transaction.
pub struct ImportLedger<'a, T: PoolTx + ?Sized> {
    tx: &'a mut T,
}

impl<'a, T: PoolTx + ?Sized> ImportLedger<'a, T> {
    pub fn new(tx: &'a mut T) -> Self {
        Self { tx }
    }

    /// Import `rows` under `request_id`.
    ///
    /// Rows are inserted as given; callers canonicalize beforehand if they
    /// want to. A reused request id with a different fingerprint fails with
    /// [`LedgerError::AuditMismatch`].
    pub fn import_batch(
        &mut self,
        request_id: &str,
        content_fingerprint: &str,
        rows: &[CodeRecord],
        now: i64,
    ) -> Result<ImportOutcome> {
        if let Some(prior) = self.tx.find_import(request_id)? {
            if prior.content_fingerprint != content_fingerprint {
                warn!(request_id, "import request id reused with different content");
                return Err(LedgerError::AuditMismatch {
                    request_id: request_id.to_string(),
                });
            }
            debug!(request_id, "import already applied");
            return Ok(ImportOutcome::AlreadyImported);
        }

        self.tx.insert_import(&ImportAuditEntry {
            request_id: request_id.to_string(),
            content_fingerprint: content_fingerprint.to_string(),
            created_at: now,
        })?;
        let inserted = self.tx.insert_codes(rows, now)?;

        debug!(request_id, rows = inserted, "import applied");
        Ok(ImportOutcome::Imported { rows: inserted })
    }
}
