use async_trait::async_trait;

use speakin_types::{AccountId, BookingId, EscrowRecord};

use crate::error::RpcResult;
use crate::message::{
    AdjustBalanceRequest, AdjustBalanceResponse, BalanceResponse, EscrowResponse,
    LockCreditsRequest, RefundLockedCreditsRequest, ReleaseLockedCreditsRequest,
};

/// The account service's balance ledger, as seen by other services.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Current balance; `NotFound` if the account does not exist.
    async fn get_balance(&self, account_id: AccountId) -> RpcResult<BalanceResponse>;

    async fn adjust_balance(&self, request: AdjustBalanceRequest) -> RpcResult<AdjustBalanceResponse>;
}

/// The payment service's escrow store, as seen by other services.
#[async_trait]
pub trait EscrowRpc: Send + Sync {
    async fn lock_credits(&self, request: LockCreditsRequest) -> RpcResult<EscrowResponse>;

    /// `NotFound` when no locked record exists, including on a repeat call.
    async fn refund_locked_credits(&self, request: RefundLockedCreditsRequest) -> RpcResult<EscrowResponse>;

    /// Succeeds without paying again when already released.
    async fn release_locked_credits(&self, request: ReleaseLockedCreditsRequest) -> RpcResult<EscrowResponse>;

    async fn get_escrow(&self, booking_id: BookingId) -> RpcResult<EscrowRecord>;

    async fn list_escrows(&self, account_id: AccountId) -> RpcResult<Vec<EscrowRecord>>;
}
