use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use speakin_protocol::{call_with_deadline, AdjustBalanceRequest, LedgerRpc};
use speakin_types::{AccountId, Clock, Credits};

use crate::error::{EscrowError, EscrowResult};

/// A completed checkout reported by the payment provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlePurchaseRequest {
    /// Provider payment reference; settles at most once.
    pub reference_id: String,
    pub account_id: AccountId,
    pub credits: Credits,
    /// Amount charged, in the currency's minor unit.
    pub amount_minor: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Completed,
    /// The buyer was charged but could not be credited.
    RefundRequired,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub reference_id: String,
    pub account_id: AccountId,
    pub credits: Credits,
    pub amount_minor: u64,
    pub status: PurchaseStatus,
    pub recorded_at: DateTime<Utc>,
}

impl PurchaseRecord {
    fn same_terms(&self, request: &SettlePurchaseRequest) -> bool {
        self.account_id == request.account_id
            && self.credits == request.credits
            && self.amount_minor == request.amount_minor
    }
}

/// Turns completed checkouts into ledger credit, keeping a transaction log.
pub struct PurchaseSettlement {
    ledger: Arc<dyn LedgerRpc>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    records: RwLock<BTreeMap<String, PurchaseRecord>>,
}

impl PurchaseSettlement {
    pub fn new(ledger: Arc<dyn LedgerRpc>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            ledger,
            clock,
            timeout,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Record the purchase and credit the buyer. Settling the same reference
    /// again returns the stored record without crediting twice.
    pub async fn settle(&self, request: &SettlePurchaseRequest) -> EscrowResult<PurchaseRecord> {
        if request.reference_id.trim().is_empty() {
            return Err(EscrowError::InvalidRequest("reference_id is required".into()));
        }
        if request.credits == 0 {
            return Err(EscrowError::InvalidRequest("credits must be positive".into()));
        }

        if let Some(existing) = self.get(&request.reference_id) {
            if !existing.same_terms(request) {
                return Err(EscrowError::InvalidRequest(format!(
                    "purchase {} was already recorded with different terms",
                    request.reference_id
                )));
            }
            return Ok(existing);
        }

        let adjust = AdjustBalanceRequest::credit_add(request.account_id, request.credits)
            .with_key(format!("purchase:{}", request.reference_id));
        let credited = call_with_deadline(
            "adjust_balance",
            self.timeout,
            self.ledger.adjust_balance(adjust),
        )
        .await;

        let status = match &credited {
            Ok(_) => PurchaseStatus::Completed,
            Err(_) => PurchaseStatus::RefundRequired,
        };
        let record = PurchaseRecord {
            reference_id: request.reference_id.clone(),
            account_id: request.account_id,
            credits: request.credits,
            amount_minor: request.amount_minor,
            status,
            recorded_at: self.clock.now(),
        };
        self.records
            .write()
            .expect("lock poisoned")
            .insert(record.reference_id.clone(), record.clone());

        match credited {
            Ok(_) => {
                info!(
                    reference = %record.reference_id,
                    account = %record.account_id.short_id(),
                    credits = record.credits,
                    "purchase settled"
                );
                Ok(record)
            }
            Err(source) => {
                error!(
                    reference = %record.reference_id,
                    account = %record.account_id.short_id(),
                    error = %source,
                    "purchase could not be credited; refund required"
                );
                Err(EscrowError::PurchaseCredit {
                    reference: record.reference_id,
                    source,
                })
            }
        }
    }

    pub fn get(&self, reference: &str) -> Option<PurchaseRecord> {
        self.records.read().expect("lock poisoned").get(reference).cloned()
    }

    pub fn require(&self, reference: &str) -> EscrowResult<PurchaseRecord> {
        self.get(reference)
            .ok_or_else(|| EscrowError::PurchaseNotFound(reference.to_string()))
    }

    pub fn list_for_account(&self, account: AccountId) -> Vec<PurchaseRecord> {
        self.records
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|r| r.account_id == account)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speakin_ledger::{BalanceReader, InMemoryBalanceLedger, LocalLedger};
    use speakin_types::SystemClock;

    const BUYER: AccountId = AccountId::new(7);

    fn settlement(ledger: &Arc<InMemoryBalanceLedger>) -> PurchaseSettlement {
        PurchaseSettlement::new(
            Arc::new(LocalLedger::new(Arc::clone(ledger))),
            Arc::new(SystemClock),
            Duration::from_secs(5),
        )
    }

    fn request(reference: &str, account: AccountId) -> SettlePurchaseRequest {
        SettlePurchaseRequest {
            reference_id: reference.into(),
            account_id: account,
            credits: 100,
            amount_minor: 1999,
        }
    }

    #[tokio::test]
    async fn settle_credits_buyer_once() {
        let ledger = Arc::new(InMemoryBalanceLedger::with_accounts([(BUYER, 5)]));
        let purchases = settlement(&ledger);
        let record = purchases.settle(&request("cs_1", BUYER)).await.unwrap();
        assert_eq!(record.status, PurchaseStatus::Completed);
        purchases.settle(&request("cs_1", BUYER)).await.unwrap();
        assert_eq!(ledger.balance(BUYER).unwrap(), 105);
        assert_eq!(purchases.list_for_account(BUYER).len(), 1);
    }

    #[tokio::test]
    async fn unknown_buyer_marks_refund_required() {
        let ledger = Arc::new(InMemoryBalanceLedger::new());
        let purchases = settlement(&ledger);
        let err = purchases.settle(&request("cs_2", BUYER)).await.unwrap_err();
        assert!(matches!(err, EscrowError::PurchaseCredit { .. }));
        assert_eq!(
            purchases.require("cs_2").unwrap().status,
            PurchaseStatus::RefundRequired
        );
    }

    #[tokio::test]
    async fn reused_reference_with_new_terms_is_rejected() {
        let ledger = Arc::new(InMemoryBalanceLedger::with_accounts([(BUYER, 0)]));
        let purchases = settlement(&ledger);
        purchases.settle(&request("cs_3", BUYER)).await.unwrap();
        let mut changed = request("cs_3", BUYER);
        changed.credits = 200;
        assert!(matches!(
            purchases.settle(&changed).await,
            Err(EscrowError::InvalidRequest(_))
        ));
        assert_eq!(ledger.balance(BUYER).unwrap(), 100);
    }

    #[tokio::test]
    async fn missing_purchase_lookup() {
        let ledger = Arc::new(InMemoryBalanceLedger::new());
        let purchases = settlement(&ledger);
        assert_eq!(
            purchases.require("nope").unwrap_err(),
            EscrowError::PurchaseNotFound("nope".into())
        );
    }
}
