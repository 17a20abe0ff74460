use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use speakin_protocol::{ErrorBody, RpcError, RpcResult};

use crate::config::ClientConfig;

/// JSON-over-HTTP plumbing shared by the service clients.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    timeout: Duration,
    bearer: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> RpcResult<Self> {
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            bearer: None,
        })
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, operation: &str, path: &str) -> RpcResult<T> {
        self.execute(operation, self.request(Method::GET, path)).await
    }

    pub async fn get_query<T, Q>(&self, operation: &str, path: &str, query: &Q) -> RpcResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.execute(operation, self.request(Method::GET, path).query(query)).await
    }

    pub async fn post_json<T, B>(&self, operation: &str, path: &str, body: &B) -> RpcResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(operation, self.request(Method::POST, path).json(body)).await
    }

    async fn execute<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> RpcResult<T> {
        let response = request.send().await.map_err(|e| self.transport_error(operation, e))?;
        let status = response.status();
        debug!(operation, status = status.as_u16(), "remote call answered");
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| RpcError::Decode(format!("{operation}: {e}")))
    }

    fn transport_error(&self, operation: &str, err: reqwest::Error) -> RpcError {
        if err.is_timeout() {
            RpcError::Timeout { operation: operation.to_string(), after: self.timeout }
        } else {
            RpcError::Transport(err.to_string())
        }
    }
}

/// Rebuild a peer's error from its `{code, message}` body. Anything else is
/// a remote failure, whatever the status says.
async fn error_from_response(response: Response) -> RpcError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => RpcError::from_body(status, body),
        Err(_) => RpcError::undecoded(status, text),
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    use std::net::SocketAddr;

    use axum::Router;

    /// Serve `router` on an ephemeral local port.
    pub async fn spawn(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }
}
