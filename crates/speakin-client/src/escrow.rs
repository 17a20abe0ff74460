use async_trait::async_trait;
use serde::Serialize;

use speakin_protocol::{
    endpoints, EscrowResponse, EscrowRpc, LockCreditsRequest, RefundLockedCreditsRequest,
    ReleaseLockedCreditsRequest, RpcResult,
};
use speakin_types::{AccountId, BookingId, EscrowRecord};

use crate::config::ClientConfig;
use crate::http::HttpTransport;

/// [`EscrowRpc`] over the payment service's HTTP API.
#[derive(Clone)]
pub struct HttpEscrowClient {
    http: HttpTransport,
}

#[derive(Serialize)]
struct AccountQuery {
    account_id: AccountId,
}

impl HttpEscrowClient {
    pub fn new(config: &ClientConfig) -> RpcResult<Self> {
        Ok(Self { http: HttpTransport::new(config)? })
    }
}

#[async_trait]
impl EscrowRpc for HttpEscrowClient {
    async fn lock_credits(&self, request: LockCreditsRequest) -> RpcResult<EscrowResponse> {
        self.http.post_json("lock_credits", endpoints::ESCROW_LOCK, &request).await
    }

    async fn refund_locked_credits(&self, request: RefundLockedCreditsRequest) -> RpcResult<EscrowResponse> {
        self.http.post_json("refund_locked_credits", endpoints::ESCROW_REFUND, &request).await
    }

    async fn release_locked_credits(&self, request: ReleaseLockedCreditsRequest) -> RpcResult<EscrowResponse> {
        self.http.post_json("release_locked_credits", endpoints::ESCROW_RELEASE, &request).await
    }

    async fn get_escrow(&self, booking_id: BookingId) -> RpcResult<EscrowRecord> {
        self.http.get_json("get_escrow", &endpoints::escrow_by_booking(booking_id)).await
    }

    async fn list_escrows(&self, account_id: AccountId) -> RpcResult<Vec<EscrowRecord>> {
        self.http
            .get_query("list_escrows", endpoints::ESCROWS, &AccountQuery { account_id })
            .await
    }
}
