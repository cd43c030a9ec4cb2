//! Request failure taxonomy
//!
//! Failures propagate only to the request's own result slot; one failed
//! request never fails siblings dispatched in the same window and never
//! poisons a cache.

use thiserror::Error;

/// Failure modes surfaced to a request's caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// No network connectivity and no cached value to fall back on.
    #[error("no network connectivity")]
    Offline,

    /// The transport gave up waiting for a response.
    #[error("request timed out")]
    Timeout,

    /// The remote endpoint answered with a failure status.
    #[error("server returned status {0}")]
    ServerError(u16),

    /// The response body could not be understood.
    #[error("invalid response payload")]
    InvalidResponse,

    /// The remote endpoint asked us to back off.
    #[error("rate limited by remote endpoint")]
    RateLimited,

    /// The request was cancelled before it was dispatched.
    #[error("request cancelled before dispatch")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(FetchError::Offline.to_string(), "no network connectivity");
        assert_eq!(
            FetchError::ServerError(503).to_string(),
            "server returned status 503"
        );
    }
}
