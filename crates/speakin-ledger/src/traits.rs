use serde::{Deserialize, Serialize};

use speakin_protocol::{AdjustBalanceRequest, AdjustBalanceResponse};
use speakin_types::{AccountId, Credits};

use crate::error::LedgerError;

/// One row of the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub balance_credits: Credits,
}

/// Write boundary for balance changes.
pub trait BalanceWriter: Send + Sync {
    /// Create the balance row for a new account.
    fn open_account(&self, account: AccountId, initial: Credits) -> Result<(), LedgerError>;

    /// Apply one adjustment. With an idempotency key, a repeat of an already
    /// applied request returns the original response marked `replayed`.
    fn adjust(&self, request: &AdjustBalanceRequest) -> Result<AdjustBalanceResponse, LedgerError>;
}

/// Read boundary for balance queries.
pub trait BalanceReader: Send + Sync {
    fn balance(&self, account: AccountId) -> Result<Credits, LedgerError>;

    fn accounts(&self) -> Result<Vec<AccountBalance>, LedgerError>;

    /// Sum of all balances.
    fn total_credits(&self) -> Result<u128, LedgerError> {
        Ok(self
            .accounts()?
            .iter()
            .map(|a| a.balance_credits as u128)
            .sum())
    }
}
