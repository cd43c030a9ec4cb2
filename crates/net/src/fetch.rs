//! Opaque asynchronous fetch seam
//!
//! The transport (HTTP client, websocket bridge, test stub) lives behind
//! the [`Fetcher`] trait. The performance layer never interprets payload
//! bytes; decoding belongs to the business layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::FetchError;

/// Shared response payload.
pub type Payload = Arc<[u8]>;

/// Query parameters passed through to the transport untouched.
pub type RequestParams = Vec<(String, String)>;

/// Boxed future returned by a [`Fetcher`].
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Payload, FetchError>> + Send>>;

/// Asynchronous fetch primitive supplied by the networking layer.
pub trait Fetcher: Send + Sync {
    /// Fetch the bytes for `endpoint` with the given parameters.
    fn fetch(&self, endpoint: &str, params: &[(String, String)]) -> FetchFuture;
}

/// Closures can stand in for a full transport, which keeps tests and
/// small integrations light.
impl<F> Fetcher for F
where
    F: Fn(&str, &[(String, String)]) -> FetchFuture + Send + Sync,
{
    fn fetch(&self, endpoint: &str, params: &[(String, String)]) -> FetchFuture {
        self(endpoint, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_fetcher() {
        let fetcher = |endpoint: &str, _params: &[(String, String)]| -> FetchFuture {
            let body: Payload = Arc::from(endpoint.as_bytes());
            Box::pin(async move { Ok(body) })
        };

        let payload = Fetcher::fetch(&fetcher, "api/scores", &[]).await.unwrap();
        assert_eq!(&payload[..], b"api/scores");
    }
}
