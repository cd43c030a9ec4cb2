//! Fieldside Network Library
//!
//! Network-facing half of the adaptive performance layer: the debounced
//! priority request batcher, the connectivity monitor that selects the
//! active optimization profile, and the request metrics the diagnostics
//! view reads.
//!
//! The actual transport is supplied by the caller as a [`Fetcher`]; this
//! crate only decides *when* and *how many* fetches run.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use fieldside_net::{Fetcher, FetchFuture, RequestBatcher, RequestPriority};
//!
//! struct StaticFetcher;
//!
//! impl Fetcher for StaticFetcher {
//!     fn fetch(&self, _endpoint: &str, _params: &[(String, String)]) -> FetchFuture {
//!         Box::pin(async { Ok(Arc::from(b"[]".as_ref())) })
//!     }
//! }
//!
//! # async fn run() {
//! let batcher = RequestBatcher::new(Arc::new(StaticFetcher));
//! let payload = batcher
//!     .request("api/standings", Vec::new(), RequestPriority::High)
//!     .await
//!     .unwrap();
//! assert_eq!(&payload[..], b"[]");
//! # }
//! ```

mod batcher;
mod error;
mod fetch;
mod metrics;
mod monitor;

pub use batcher::{
    BatchProfile, BatcherStats, RequestBatcher, RequestId, RequestPriority, ResponseSlot,
};
pub use error::FetchError;
pub use fetch::{FetchFuture, Fetcher, Payload, RequestParams};
pub use metrics::{NetworkMetrics, NetworkMetricsSnapshot};
pub use monitor::{
    Connectivity, NetworkConditionMonitor, OptimizationLevel, OptimizationProfile, ProfileTable,
};
