use std::future::Future;
use std::time::Duration;

use crate::error::{RpcError, RpcResult};

/// Await `call`, failing with [`RpcError::Timeout`] once `limit` elapses.
///
/// A timed-out call may still have been applied by the peer; callers must
/// treat it as a failure and follow their compensation path.
pub async fn call_with_deadline<T, F>(operation: &str, limit: Duration, call: F) -> RpcResult<T>
where
    F: Future<Output = RpcResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, ?limit, "remote call timed out");
            Err(RpcError::Timeout { operation: operation.to_string(), after: limit })
        }
    }
}
