//! RequestLedger: the append-only redemption audit log.
//!
//! Every first-time redemption request leaves exactly one entry, success or
//! failure. A retry with the same request id is answered from that entry
//! instead of running again, which is what makes retries safe.

use serde_json::Value;
use tracing::{debug, warn};

use codepool_core::{AuditEntry, AuditField, AuditParams, Rejection};
use codepool_store::{PoolTx, StoreError};

use crate::error::{LedgerError, Result};

/// An outcome already on record for a request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorOutcome {
    /// The request succeeded; this is its recorded response payload.
    Succeeded(Value),
    /// The request failed; retries must fail the same way.
    Failed(Rejection),
}

/// The audit log of one pool, viewed through an open transaction.
pub struct RequestLedger<'a, T: PoolTx + ?Sized> {
    tx: &'a mut T,
}

impl<'a, T: PoolTx + ?Sized> RequestLedger<'a, T> {
    pub fn new(tx: &'a mut T) -> Self {
        Self { tx }
    }

    /// Look for an earlier request with this id.
    ///
    /// - `None`: first time; the caller executes the operation.
    /// - `Some(_)`: the identity and request payload matched exactly; the
    ///   caller returns the recorded outcome.
    /// - [`LedgerError::AuditMismatch`]: the id is taken by a request with
    ///   different parameters.
    ///
    /// The comparison is exact. Callers pass the payload as submitted, before
    /// any normalization.
    pub fn check_prior(
        &mut self,
        params: &AuditParams,
        request: &Value,
    ) -> Result<Option<PriorOutcome>> {
        let Some(entry) = self.tx.find_audit(&params.request_id)? else {
            return Ok(None);
        };

        if entry.params() != *params || entry.request_data != *request {
            warn!(
                request_id = %params.request_id,
                "request id reused with different parameters"
            );
            return Err(LedgerError::AuditMismatch {
                request_id: params.request_id.clone(),
            });
        }

        debug!(request_id = %params.request_id, error = entry.error, "replaying recorded outcome");
        if entry.error {
            let rejection: Rejection = serde_json::from_value(entry.response_data)
                .map_err(|e| StoreError::InvalidData(format!("audit response: {}", e)))?;
            Ok(Some(PriorOutcome::Failed(rejection)))
        } else {
            Ok(Some(PriorOutcome::Succeeded(entry.response_data)))
        }
    }

    /// Append the entry for a first-time request.
    ///
    /// Never call this for a replay. Fails with
    /// [`StoreError::DuplicateRequest`] if a concurrent request with the same
    /// id got there first.
    pub fn record(
        &mut self,
        params: &AuditParams,
        request: Value,
        response: Value,
        error: bool,
        unique_code: Option<String>,
        now: i64,
    ) -> Result<()> {
        self.tx.insert_audit(&AuditEntry {
            request_id: params.request_id.clone(),
            transaction_id: params.transaction_id.clone(),
            user_id: params.user_id.clone(),
            request_data: request,
            response_data: response,
            error,
            created_at: now,
            unique_code,
        })?;
        Ok(())
    }

    /// All entries whose `field` equals `value`, oldest first.
    pub fn query(&mut self, field: AuditField, value: &str) -> Result<Vec<AuditEntry>> {
        Ok(self.tx.query_audit(field, value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepool_core::{PoolName, RejectReason};
    use codepool_store::{MemoryStore, Store};
    use serde_json::json;

    fn params(request_id: &str) -> AuditParams {
        AuditParams::new(
            request_id,
            format!("tx-{request_id}"),
            format!("user-tx-{request_id}"),
        )
    }

    async fn store() -> (MemoryStore, PoolName) {
        let store = MemoryStore::new();
        let pool = PoolName::new("testpool").unwrap();
        store.create_pool(&pool).await.unwrap();
        (store, pool)
    }

    #[tokio::test]
    async fn test_first_time_has_no_prior() {
        let (store, pool) = store().await;
        let prior = store
            .transact(&pool, |tx| {
                RequestLedger::new(tx).check_prior(&params("req-0"), &json!({"candidate_code": "v0"}))
            })
            .await
            .unwrap();
        assert_eq!(prior, None);
    }

    #[tokio::test]
    async fn test_replays_success() {
        let (store, pool) = store().await;
        let request = json!({"candidate_code": "v0"});
        let response = json!({"id": 1, "unique_code": "v0"});

        let (req, resp) = (request.clone(), response.clone());
        store
            .transact(&pool, move |tx| {
                RequestLedger::new(tx).record(&params("req-0"), req, resp, false, Some("v0".into()), 1)
            })
            .await
            .unwrap();

        let prior = store
            .transact(&pool, move |tx| RequestLedger::new(tx).check_prior(&params("req-0"), &request))
            .await
            .unwrap();
        assert_eq!(prior, Some(PriorOutcome::Succeeded(response)));
    }

    #[tokio::test]
    async fn test_replays_failure() {
        let (store, pool) = store().await;
        let request = json!({"candidate_code": "V-0"});
        let response = json!({"reason": "used", "unique_code": "v0"});

        let req = request.clone();
        store
            .transact(&pool, move |tx| {
                RequestLedger::new(tx).record(&params("req-0"), req, response, true, Some("v0".into()), 1)
            })
            .await
            .unwrap();

        let prior = store
            .transact(&pool, move |tx| RequestLedger::new(tx).check_prior(&params("req-0"), &request))
            .await
            .unwrap();
        assert_eq!(
            prior,
            Some(PriorOutcome::Failed(Rejection {
                reason: RejectReason::Used,
                unique_code: "v0".into(),
            }))
        );
    }

    #[tokio::test]
    async fn test_mismatch_on_identity_or_payload() {
        let (store, pool) = store().await;
        store
            .transact(&pool, |tx| {
                RequestLedger::new(tx).record(
                    &params("req-0"),
                    json!({"candidate_code": "v0"}),
                    json!({}),
                    false,
                    None,
                    1,
                )
            })
            .await
            .unwrap();

        let mut other_tx = params("req-0");
        other_tx.transaction_id = "foo".into();
        let err = store
            .transact(&pool, move |tx| {
                RequestLedger::new(tx).check_prior(&other_tx, &json!({"candidate_code": "v0"}))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AuditMismatch { ref request_id } if request_id == "req-0"));

        // A payload that canonicalizes to the same code is still a different request.
        let err = store
            .transact(&pool, |tx| {
                RequestLedger::new(tx).check_prior(&params("req-0"), &json!({"candidate_code": "V0"}))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AuditMismatch { .. }));
    }

    #[tokio::test]
    async fn test_record_twice_is_duplicate() {
        fn record(tx: &mut dyn PoolTx) -> Result<()> {
            RequestLedger::new(tx).record(&params("req-0"), json!({}), json!({}), false, None, 1)
        }

        let (store, pool) = store().await;
        store.transact(&pool, record).await.unwrap();
        let err = store.transact(&pool, record).await.unwrap_err();
        assert!(matches!(err, LedgerError::Store(StoreError::DuplicateRequest(_))));
    }
}
