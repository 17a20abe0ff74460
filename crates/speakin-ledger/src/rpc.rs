use std::sync::Arc;

use async_trait::async_trait;

use speakin_protocol::{
    AdjustBalanceRequest, AdjustBalanceResponse, BalanceResponse, LedgerRpc, RpcResult,
};
use speakin_types::AccountId;

use crate::traits::{BalanceReader, BalanceWriter};

/// In-process [`LedgerRpc`] over a ledger owned by the same binary.
pub struct LocalLedger<L: ?Sized> {
    ledger: Arc<L>,
}

impl<L: ?Sized> LocalLedger<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }
}

impl<L: ?Sized> Clone for LocalLedger<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

#[async_trait]
impl<L> LedgerRpc for LocalLedger<L>
where
    L: BalanceReader + BalanceWriter + ?Sized + 'static,
{
    async fn get_balance(&self, account_id: AccountId) -> RpcResult<BalanceResponse> {
        let balance_credits = self.ledger.balance(account_id)?;
        Ok(BalanceResponse {
            account_id,
            balance_credits,
        })
    }

    async fn adjust_balance(&self, request: AdjustBalanceRequest) -> RpcResult<AdjustBalanceResponse> {
        Ok(self.ledger.adjust(&request)?)
    }
}
