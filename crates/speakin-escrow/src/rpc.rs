use std::sync::Arc;

use async_trait::async_trait;

use speakin_protocol::{
    EscrowResponse, EscrowRpc, LockCreditsRequest, RefundLockedCreditsRequest,
    ReleaseLockedCreditsRequest, RpcResult,
};
use speakin_types::{AccountId, BookingId, EscrowRecord};

use crate::service::EscrowService;
use crate::store::EscrowStore;

/// In-process [`EscrowRpc`] over an escrow service owned by the same binary.
pub struct LocalEscrow<S> {
    service: Arc<EscrowService<S>>,
}

impl<S> LocalEscrow<S> {
    pub fn new(service: Arc<EscrowService<S>>) -> Self {
        Self { service }
    }
}

impl<S> Clone for LocalEscrow<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

#[async_trait]
impl<S> EscrowRpc for LocalEscrow<S>
where
    S: EscrowStore + 'static,
{
    async fn lock_credits(&self, request: LockCreditsRequest) -> RpcResult<EscrowResponse> {
        Ok(self.service.lock(&request).await?)
    }

    async fn refund_locked_credits(&self, request: RefundLockedCreditsRequest) -> RpcResult<EscrowResponse> {
        Ok(self.service.refund(request.booking_id).await?)
    }

    async fn release_locked_credits(&self, request: ReleaseLockedCreditsRequest) -> RpcResult<EscrowResponse> {
        Ok(self.service.release(&request).await?)
    }

    async fn get_escrow(&self, booking_id: BookingId) -> RpcResult<EscrowRecord> {
        Ok(self.service.get(booking_id)?)
    }

    async fn list_escrows(&self, account_id: AccountId) -> RpcResult<Vec<EscrowRecord>> {
        Ok(self.service.list(account_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEscrowStore;
    use speakin_ledger::{InMemoryBalanceLedger, LocalLedger};
    use speakin_types::{PayoutPolicy, SystemClock};

    fn rpc() -> LocalEscrow<InMemoryEscrowStore> {
        let ledger = Arc::new(InMemoryBalanceLedger::with_accounts([
            (AccountId::new(1), 0),
            (AccountId::new(2), 0),
        ]));
        LocalEscrow::new(Arc::new(EscrowService::new(
            Arc::new(InMemoryEscrowStore::new()),
            Arc::new(LocalLedger::new(ledger)),
            PayoutPolicy::default(),
            Arc::new(SystemClock),
        )))
    }

    #[tokio::test]
    async fn second_refund_maps_to_not_found() {
        let escrow = rpc();
        escrow
            .lock_credits(LockCreditsRequest {
                student_id: AccountId::new(1),
                tutor_id: AccountId::new(2),
                booking_id: BookingId::new(3),
                credits_required: 10,
            })
            .await
            .unwrap();
        let req = RefundLockedCreditsRequest { booking_id: BookingId::new(3) };
        assert!(escrow.refund_locked_credits(req.clone()).await.unwrap().success);
        assert!(escrow.refund_locked_credits(req).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn get_missing_escrow_is_not_found() {
        assert!(rpc().get_escrow(BookingId::new(1)).await.unwrap_err().is_not_found());
    }
}
