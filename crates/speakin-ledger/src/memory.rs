use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use tracing::{debug, info};

use speakin_protocol::{AdjustBalanceRequest, AdjustBalanceResponse, AdjustMode};
use speakin_types::{AccountId, Credits};

use crate::error::LedgerError;
use crate::traits::{AccountBalance, BalanceReader, BalanceWriter};

/// In-memory balance ledger for tests, local demos, and single-node serving.
///
/// All adjustments run under one write lock, so check-and-deduct is atomic
/// with respect to every other adjustment.
pub struct InMemoryBalanceLedger {
    inner: RwLock<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    balances: BTreeMap<AccountId, Credits>,
    applied: HashMap<String, AppliedAdjustment>,
}

struct AppliedAdjustment {
    request: AdjustBalanceRequest,
    response: AdjustBalanceResponse,
}

impl InMemoryBalanceLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerState::default()),
        }
    }

    /// Ledger pre-seeded with the given balances.
    pub fn with_accounts(accounts: impl IntoIterator<Item = (AccountId, Credits)>) -> Self {
        let state = LedgerState {
            balances: accounts.into_iter().collect(),
            applied: HashMap::new(),
        };
        Self {
            inner: RwLock::new(state),
        }
    }

    fn apply(
        balances: &mut BTreeMap<AccountId, Credits>,
        request: &AdjustBalanceRequest,
    ) -> Result<Credits, LedgerError> {
        let account = request.account_id;
        let balance = balances
            .get_mut(&account)
            .ok_or(LedgerError::AccountNotFound(account))?;

        let next = match request.mode {
            AdjustMode::AbsoluteSet => request.amount,
            AdjustMode::CreditAdd => balance
                .checked_add(request.amount)
                .ok_or(LedgerError::Overflow(account))?,
            AdjustMode::Deduct => {
                balance
                    .checked_sub(request.amount)
                    .ok_or(LedgerError::InsufficientCredits {
                        account,
                        balance: *balance,
                        requested: request.amount,
                    })?
            }
        };
        *balance = next;
        Ok(next)
    }
}

impl Default for InMemoryBalanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryBalanceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let accounts = self.inner.read().map(|s| s.balances.len()).unwrap_or(0);
        f.debug_struct("InMemoryBalanceLedger")
            .field("accounts", &accounts)
            .finish()
    }
}

impl BalanceWriter for InMemoryBalanceLedger {
    fn open_account(&self, account: AccountId, initial: Credits) -> Result<(), LedgerError> {
        let mut state = self.inner.write().map_err(|_| LedgerError::LockPoisoned)?;
        if state.balances.contains_key(&account) {
            return Err(LedgerError::AccountExists(account));
        }
        state.balances.insert(account, initial);
        info!(account = %account.short_id(), initial, "account opened");
        Ok(())
    }

    fn adjust(&self, request: &AdjustBalanceRequest) -> Result<AdjustBalanceResponse, LedgerError> {
        let mut state = self.inner.write().map_err(|_| LedgerError::LockPoisoned)?;

        if let Some(key) = &request.idempotency_key {
            if let Some(applied) = state.applied.get(key) {
                if applied.request != *request {
                    return Err(LedgerError::IdempotencyConflict(key.clone()));
                }
                debug!(key = %key, account = %request.account_id.short_id(), "adjustment replayed");
                return Ok(AdjustBalanceResponse {
                    replayed: true,
                    ..applied.response.clone()
                });
            }
        }

        let balance = Self::apply(&mut state.balances, request)?;
        let response = AdjustBalanceResponse {
            success: true,
            account_id: request.account_id,
            balance_credits: balance,
            replayed: false,
        };

        if let Some(key) = &request.idempotency_key {
            state.applied.insert(
                key.clone(),
                AppliedAdjustment {
                    request: request.clone(),
                    response: response.clone(),
                },
            );
        }

        debug!(
            account = %request.account_id.short_id(),
            mode = ?request.mode,
            amount = request.amount,
            balance,
            "balance adjusted"
        );
        Ok(response)
    }
}

impl BalanceReader for InMemoryBalanceLedger {
    fn balance(&self, account: AccountId) -> Result<Credits, LedgerError> {
        let state = self.inner.read().map_err(|_| LedgerError::LockPoisoned)?;
        state
            .balances
            .get(&account)
            .copied()
            .ok_or(LedgerError::AccountNotFound(account))
    }

    fn accounts(&self) -> Result<Vec<AccountBalance>, LedgerError> {
        let state = self.inner.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(state
            .balances
            .iter()
            .map(|(id, credits)| AccountBalance {
                account_id: *id,
                balance_credits: *credits,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    const ALICE: AccountId = AccountId::new(1);
    const BOB: AccountId = AccountId::new(2);

    fn ledger() -> InMemoryBalanceLedger {
        InMemoryBalanceLedger::with_accounts([(ALICE, 100), (BOB, 0)])
    }

    #[test]
    fn open_and_read() {
        let ledger = InMemoryBalanceLedger::new();
        ledger.open_account(ALICE, 25).unwrap();
        assert_eq!(ledger.balance(ALICE).unwrap(), 25);
        assert_eq!(
            ledger.open_account(ALICE, 1),
            Err(LedgerError::AccountExists(ALICE))
        );
    }

    #[test]
    fn missing_account_is_not_found() {
        let ledger = ledger();
        let ghost = AccountId::new(99);
        assert_eq!(ledger.balance(ghost), Err(LedgerError::AccountNotFound(ghost)));
        let err = ledger
            .adjust(&AdjustBalanceRequest::credit_add(ghost, 5))
            .unwrap_err();
        assert_eq!(err, LedgerError::AccountNotFound(ghost));
    }

    #[test]
    fn absolute_set_overwrites() {
        let ledger = ledger();
        let resp = ledger
            .adjust(&AdjustBalanceRequest::absolute_set(ALICE, 70))
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.balance_credits, 70);
    }

    #[test]
    fn credit_add_adds() {
        let ledger = ledger();
        ledger.adjust(&AdjustBalanceRequest::credit_add(BOB, 40)).unwrap();
        assert_eq!(ledger.balance(BOB).unwrap(), 40);
    }

    #[test]
    fn credit_add_overflow_is_rejected() {
        let ledger = InMemoryBalanceLedger::with_accounts([(ALICE, u64::MAX)]);
        let err = ledger
            .adjust(&AdjustBalanceRequest::credit_add(ALICE, 1))
            .unwrap_err();
        assert_eq!(err, LedgerError::Overflow(ALICE));
        assert_eq!(ledger.balance(ALICE).unwrap(), u64::MAX);
    }

    #[test]
    fn deduct_requires_sufficient_balance() {
        let ledger = ledger();
        ledger.adjust(&AdjustBalanceRequest::deduct(ALICE, 100)).unwrap();
        assert_eq!(ledger.balance(ALICE).unwrap(), 0);

        let err = ledger
            .adjust(&AdjustBalanceRequest::deduct(ALICE, 1))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientCredits {
                account: ALICE,
                balance: 0,
                requested: 1
            }
        );
        assert_eq!(ledger.balance(ALICE).unwrap(), 0);
    }

    #[test]
    fn idempotency_key_applies_once() {
        let ledger = ledger();
        let req = AdjustBalanceRequest::deduct(ALICE, 30).with_key("booking:1:deduct");
        let first = ledger.adjust(&req).unwrap();
        let second = ledger.adjust(&req).unwrap();
        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(second.balance_credits, 70);
        assert_eq!(ledger.balance(ALICE).unwrap(), 70);
    }

    #[test]
    fn idempotency_key_reuse_with_different_request_conflicts() {
        let ledger = ledger();
        ledger
            .adjust(&AdjustBalanceRequest::deduct(ALICE, 30).with_key("k"))
            .unwrap();
        let err = ledger
            .adjust(&AdjustBalanceRequest::deduct(ALICE, 31).with_key("k"))
            .unwrap_err();
        assert_eq!(err, LedgerError::IdempotencyConflict("k".into()));
    }

    #[test]
    fn failed_adjustment_does_not_consume_key() {
        let ledger = ledger();
        let req = AdjustBalanceRequest::deduct(ALICE, 500).with_key("big");
        assert!(ledger.adjust(&req).is_err());
        ledger
            .adjust(&AdjustBalanceRequest::absolute_set(ALICE, 600))
            .unwrap();
        let resp = ledger.adjust(&req).unwrap();
        assert!(!resp.replayed);
        assert_eq!(resp.balance_credits, 100);
    }

    #[test]
    fn concurrent_deducts_never_overdraw() {
        let ledger = Arc::new(InMemoryBalanceLedger::with_accounts([(ALICE, 100)]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger
                        .adjust(&AdjustBalanceRequest::deduct(ALICE, 30))
                        .is_ok()
                })
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 3);
        assert_eq!(ledger.balance(ALICE).unwrap(), 10);
    }

    #[test]
    fn total_credits_sums_accounts() {
        let ledger = ledger();
        assert_eq!(ledger.total_credits().unwrap(), 100);
        assert_eq!(ledger.accounts().unwrap().len(), 2);
    }

    proptest! {
        #[test]
        fn deduct_then_credit_restores(start in 0u64..1_000_000, amount in 0u64..1_000_000) {
            let ledger = InMemoryBalanceLedger::with_accounts([(ALICE, start)]);
            match ledger.adjust(&AdjustBalanceRequest::deduct(ALICE, amount)) {
                Ok(resp) => {
                    prop_assert!(amount <= start);
                    prop_assert_eq!(resp.balance_credits, start - amount);
                    ledger.adjust(&AdjustBalanceRequest::credit_add(ALICE, amount)).unwrap();
                }
                Err(_) => prop_assert!(amount > start),
            }
            prop_assert_eq!(ledger.balance(ALICE).unwrap(), start);
        }
    }
}
