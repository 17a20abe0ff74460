use async_trait::async_trait;

use speakin_protocol::{
    endpoints, AdjustBalanceRequest, AdjustBalanceResponse, BalanceResponse, LedgerRpc,
    OpenAccountRequest, RpcResult,
};
use speakin_types::AccountId;

use crate::config::ClientConfig;
use crate::http::HttpTransport;

/// [`LedgerRpc`] over the account service's HTTP API.
#[derive(Clone)]
pub struct HttpLedgerClient {
    http: HttpTransport,
}

impl HttpLedgerClient {
    pub fn new(config: &ClientConfig) -> RpcResult<Self> {
        Ok(Self { http: HttpTransport::new(config)? })
    }

    pub async fn open_account(&self, request: &OpenAccountRequest) -> RpcResult<BalanceResponse> {
        self.http.post_json("open_account", endpoints::ACCOUNTS, request).await
    }

    pub async fn list_accounts(&self) -> RpcResult<Vec<BalanceResponse>> {
        self.http.get_json("list_accounts", endpoints::ACCOUNTS).await
    }
}

#[async_trait]
impl LedgerRpc for HttpLedgerClient {
    async fn get_balance(&self, account_id: AccountId) -> RpcResult<BalanceResponse> {
        self.http
            .get_json("get_balance", &endpoints::account_balance(account_id))
            .await
    }

    async fn adjust_balance(&self, request: AdjustBalanceRequest) -> RpcResult<AdjustBalanceResponse> {
        self.http
            .post_json("adjust_balance", &endpoints::account_adjust(request.account_id), &request)
            .await
    }
}
