//! RedemptionEngine: the per-code state machine.
//!
//! ```text
//! Unknown (no row) ──► Available (used = false) ──► Redeemed (used = true)
//! ```
//!
//! `Redeemed` is terminal. The engine runs inside one store transaction, so
//! the state transition and its audit entry commit together or not at all.

use serde_json::Value;
use tracing::{debug, warn};

use codepool_core::{
    canonicalize, AuditParams, RedeemRequest, RedeemedCode, RejectReason, Rejection,
};
use codepool_store::PoolTx;

use crate::audit::{PriorOutcome, RequestLedger};
use crate::error::{LedgerError, Result};

/// Result of one call to [`RedemptionEngine::redeem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// First-time request; the code moved to `Redeemed`.
    Redeemed(RedeemedCode),
    /// First-time request; the code could not be redeemed.
    Rejected(Rejection),
    /// The request id was seen before; this is its recorded outcome.
    Replayed(std::result::Result<RedeemedCode, Rejection>),
}

impl RedeemOutcome {
    /// Collapse into the caller-facing result, turning rejections into
    /// [`LedgerError::CannotRedeem`].
    pub fn into_result(self) -> Result<RedeemedCode> {
        match self {
            RedeemOutcome::Redeemed(code) | RedeemOutcome::Replayed(Ok(code)) => Ok(code),
            RedeemOutcome::Rejected(r) | RedeemOutcome::Replayed(Err(r)) => {
                Err(LedgerError::CannotRedeem {
                    reason: r.reason,
                    code: r.unique_code,
                })
            }
        }
    }

    /// True if this outcome came from the audit log rather than a fresh run.
    pub fn is_replay(&self) -> bool {
        matches!(self, RedeemOutcome::Replayed(_))
    }
}

/// Redeems codes in one pool through an open transaction.
pub struct RedemptionEngine<'a, T: PoolTx + ?Sized> {
    tx: &'a mut T,
    reason: &'a str,
}

impl<'a, T: PoolTx + ?Sized> RedemptionEngine<'a, T> {
    /// `reason` is written to the code row on a successful transition.
    pub fn new(tx: &'a mut T, reason: &'a str) -> Self {
        Self { tx, reason }
    }

    /// Redeem `candidate_code` on behalf of `params`.
    ///
    /// The replay check runs on the raw code, before canonicalization. A
    /// first-time request always leaves exactly one audit entry, including
    /// when it is rejected.
    pub fn redeem(
        &mut self,
        params: &AuditParams,
        candidate_code: &str,
        now: i64,
    ) -> Result<RedeemOutcome> {
        let request = serde_json::to_value(RedeemRequest {
            candidate_code: candidate_code.to_string(),
        })?;

        match RequestLedger::new(&mut *self.tx).check_prior(params, &request)? {
            Some(PriorOutcome::Succeeded(response)) => {
                let code: RedeemedCode = serde_json::from_value(response)?;
                return Ok(RedeemOutcome::Replayed(Ok(code)));
            }
            Some(PriorOutcome::Failed(rejection)) => {
                return Ok(RedeemOutcome::Replayed(Err(rejection)));
            }
            None => {}
        }

        let code = canonicalize(candidate_code);
        let attempt = self.attempt(&code, now)?;

        let mut ledger = RequestLedger::new(&mut *self.tx);
        match attempt {
            Ok(redeemed) => {
                let response = serde_json::to_value(&redeemed)?;
                ledger.record(params, request, response, false, Some(code), now)?;
                debug!(request_id = %params.request_id, id = redeemed.id, "code redeemed");
                Ok(RedeemOutcome::Redeemed(redeemed))
            }
            Err(rejection) => {
                let response: Value = serde_json::to_value(&rejection)?;
                ledger.record(params, request, response, true, Some(code), now)?;
                debug!(
                    request_id = %params.request_id,
                    reason = %rejection.reason,
                    "redemption rejected"
                );
                Ok(RedeemOutcome::Rejected(rejection))
            }
        }
    }

    /// Drive the state machine for a canonical code.
    fn attempt(
        &mut self,
        code: &str,
        now: i64,
    ) -> Result<std::result::Result<RedeemedCode, Rejection>> {
        let reject = |reason| Rejection {
            reason,
            unique_code: code.to_string(),
        };

        let Some(mut row) = self.tx.find_code(code)? else {
            return Ok(Err(reject(RejectReason::Invalid)));
        };
        if row.used {
            return Ok(Err(reject(RejectReason::Used)));
        }

        if !self.tx.try_redeem(row.id, self.reason, now)? {
            warn!(id = row.id, "lost redemption race");
            return Ok(Err(reject(RejectReason::Used)));
        }

        // Record the row as it stands after the transition.
        row.used = true;
        row.reason = Some(self.reason.to_string());
        row.modified_at = now;
        Ok(Ok(row.public_view()))
    }
}
