//! Debounced priority request batcher
//!
//! Coalesces many logical fetches into bounded-concurrency dispatch
//! windows. Submissions accumulate while a debounce timer runs; when it
//! fires, the highest-priority pending requests are dispatched together,
//! each resolving its own result slot independently. The timer re-arms
//! until the queue drains.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::FetchError;
use crate::fetch::{Fetcher, Payload, RequestParams};
use crate::metrics::NetworkMetrics;

/// Unique request identifier, assigned at submission.
pub type RequestId = u64;

/// Request priority levels.
///
/// Priority determines *inclusion* order across dispatch windows: a
/// `Critical` request submitted after a queue full of `Low` requests is
/// still dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestPriority {
    /// Speculative work (preloads); first to wait, first to be cancelled.
    Low = 0,

    /// Routine data loads.
    Normal = 1,

    /// Data the user is waiting on.
    High = 2,

    /// User-blocking requests that must go out in the next window.
    Critical = 3,
}

/// Concurrency/debounce profile applied to dispatch windows.
///
/// Replaced wholesale by the connectivity monitor; the batcher never
/// mutates individual fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProfile {
    /// Maximum requests dispatched per window.
    pub max_concurrent_requests: usize,

    /// Debounce delay before a window fires.
    pub batching_delay: Duration,
}

impl Default for BatchProfile {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 6,
            batching_delay: Duration::from_millis(100),
        }
    }
}

/// Batcher statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatcherStats {
    /// Requests accepted via submit.
    pub submitted: u64,

    /// Requests handed to the transport.
    pub dispatched: u64,

    /// Requests that resolved successfully.
    pub completed: u64,

    /// Requests that resolved with an error.
    pub failed: u64,

    /// Requests cancelled before dispatch.
    pub cancelled: u64,

    /// Requests currently queued.
    pub pending: usize,
}

/// Result slot for a submitted request.
///
/// A single-fulfillment future: resolves exactly once, with the payload
/// or the request's own error. Dropping the slot abandons interest
/// without affecting sibling requests.
pub struct ResponseSlot {
    rx: oneshot::Receiver<Result<Payload, FetchError>>,
}

impl Future for ResponseSlot {
    type Output = Result<Payload, FetchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The sender side only disappears when the request is dropped
            // without dispatch (e.g. batcher teardown).
            Poll::Ready(Err(_)) => Poll::Ready(Err(FetchError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct PendingRequest {
    id: RequestId,
    endpoint: String,
    params: RequestParams,
    priority: RequestPriority,
    slot: oneshot::Sender<Result<Payload, FetchError>>,
    seq: u64,
}

impl PartialEq for PendingRequest {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PendingRequest {}

impl PartialOrd for PendingRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; within a priority, earlier submissions
        // first (the heap is a max-heap, so the sequence compare flips).
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

struct QueueState {
    heap: BinaryHeap<PendingRequest>,
    next_id: RequestId,
    next_seq: u64,
    timer_armed: bool,
    stats: BatcherStats,
}

struct BatcherInner {
    queue: Mutex<QueueState>,
    profile: Mutex<BatchProfile>,
    offline: AtomicBool,
    fetcher: Arc<dyn Fetcher>,
    metrics: NetworkMetrics,
}

/// Debounced, priority-ordered request batcher.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use fieldside_net::{FetchFuture, RequestBatcher, RequestPriority};
///
/// # async fn run() {
/// let fetcher = |_endpoint: &str, _params: &[(String, String)]| -> FetchFuture {
///     Box::pin(async { Ok(Arc::from(b"{}".as_ref())) })
/// };
/// let batcher = RequestBatcher::new(Arc::new(fetcher));
///
/// let (_id, slot) = batcher.submit(
///     "api/players/412",
///     Vec::new(),
///     RequestPriority::Critical,
/// );
/// let payload = slot.await.unwrap();
/// assert_eq!(&payload[..], b"{}");
/// # }
/// ```
#[derive(Clone)]
pub struct RequestBatcher {
    inner: Arc<BatcherInner>,
}

impl RequestBatcher {
    /// Create a batcher over the given transport with the default
    /// profile.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_profile(fetcher, BatchProfile::default())
    }

    /// Create a batcher with an explicit initial profile.
    pub fn with_profile(fetcher: Arc<dyn Fetcher>, profile: BatchProfile) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                queue: Mutex::new(QueueState {
                    heap: BinaryHeap::new(),
                    next_id: 1,
                    next_seq: 0,
                    timer_armed: false,
                    stats: BatcherStats::default(),
                }),
                profile: Mutex::new(profile),
                offline: AtomicBool::new(false),
                fetcher,
                metrics: NetworkMetrics::new(),
            }),
        }
    }

    /// Queue a request and return its id and result slot.
    ///
    /// The first pending submission arms the debounce timer; when it
    /// fires, the highest-priority requests (up to the profile's window
    /// width) are dispatched concurrently. The id can be used to cancel
    /// the request while it is still queued.
    pub fn submit(
        &self,
        endpoint: &str,
        params: RequestParams,
        priority: RequestPriority,
    ) -> (RequestId, ResponseSlot) {
        let (tx, rx) = oneshot::channel();

        let id = {
            let mut queue = self.inner.queue.lock().unwrap();
            let id = queue.next_id;
            queue.next_id += 1;
            let seq = queue.next_seq;
            queue.next_seq += 1;

            queue.heap.push(PendingRequest {
                id,
                endpoint: endpoint.to_string(),
                params,
                priority,
                slot: tx,
                seq,
            });
            queue.stats.submitted += 1;
            id
        };

        self.arm_timer();

        (id, ResponseSlot { rx })
    }

    /// Submit and await the result in one call.
    pub async fn request(
        &self,
        endpoint: &str,
        params: RequestParams,
        priority: RequestPriority,
    ) -> Result<Payload, FetchError> {
        let (_id, slot) = self.submit(endpoint, params, priority);
        slot.await
    }

    /// Cancel a queued request.
    ///
    /// Only requests that have not yet been dispatched can be cancelled;
    /// their slots resolve with [`FetchError::Cancelled`]. Returns `true`
    /// if the request was found in the queue.
    pub fn cancel(&self, id: RequestId) -> bool {
        self.cancel_where(|request_id, _, _| request_id == id) > 0
    }

    /// Cancel every queued request matching the predicate.
    ///
    /// The predicate sees `(id, endpoint, priority)`. Returns the number
    /// cancelled.
    pub fn cancel_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(RequestId, &str, RequestPriority) -> bool,
    {
        let mut queue = self.inner.queue.lock().unwrap();

        let mut kept = Vec::with_capacity(queue.heap.len());
        let mut cancelled = 0;
        while let Some(request) = queue.heap.pop() {
            if predicate(request.id, &request.endpoint, request.priority) {
                let _ = request.slot.send(Err(FetchError::Cancelled));
                cancelled += 1;
            } else {
                kept.push(request);
            }
        }
        queue.heap = kept.into_iter().collect();
        queue.stats.cancelled += cancelled as u64;

        cancelled
    }

    /// Replace the active profile.
    ///
    /// The swap is a whole-value replacement; the next dispatch window
    /// uses the new delay and width.
    pub fn reconfigure(&self, profile: BatchProfile) {
        *self.inner.profile.lock().unwrap() = profile;
    }

    /// The active profile.
    pub fn profile(&self) -> BatchProfile {
        *self.inner.profile.lock().unwrap()
    }

    /// Toggle offline mode.
    ///
    /// While offline, dispatched requests fail fast with
    /// [`FetchError::Offline`] instead of reaching the transport.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, AtomicOrdering::Release);
    }

    /// Whether the batcher is in offline mode.
    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(AtomicOrdering::Acquire)
    }

    /// Number of requests waiting for a dispatch window.
    pub fn pending_len(&self) -> usize {
        self.inner.queue.lock().unwrap().heap.len()
    }

    /// Batcher statistics.
    pub fn stats(&self) -> BatcherStats {
        let queue = self.inner.queue.lock().unwrap();
        let mut stats = queue.stats;
        stats.pending = queue.heap.len();
        stats
    }

    /// Shared metrics recorder (completion latency, throughput, bytes).
    pub fn metrics(&self) -> NetworkMetrics {
        self.inner.metrics.clone()
    }

    /// Arm the debounce timer if it is not already running.
    fn arm_timer(&self) {
        {
            let mut queue = self.inner.queue.lock().unwrap();
            if queue.timer_armed || queue.heap.is_empty() {
                return;
            }
            queue.timer_armed = true;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                let delay = inner.profile.lock().unwrap().batching_delay;
                tokio::time::sleep(delay).await;

                let width = inner.profile.lock().unwrap().max_concurrent_requests.max(1);
                let batch = {
                    let mut queue = inner.queue.lock().unwrap();
                    let mut batch = Vec::with_capacity(width);
                    while batch.len() < width {
                        match queue.heap.pop() {
                            Some(request) => batch.push(request),
                            None => break,
                        }
                    }
                    queue.stats.dispatched += batch.len() as u64;
                    batch
                };

                if !batch.is_empty() {
                    tracing::debug!(window = batch.len(), "dispatching request batch");
                }
                let mut window = tokio::task::JoinSet::new();
                for request in batch {
                    window.spawn(BatcherInner::run_one(Arc::clone(&inner), request));
                }
                // The window bounds concurrency: the next one opens only
                // after this one fully resolves.
                while window.join_next().await.is_some() {}

                // Disarm under the same lock that submitters use to arm,
                // so a request arriving now either sees a running loop or
                // spawns a fresh one.
                let mut queue = inner.queue.lock().unwrap();
                if queue.heap.is_empty() {
                    queue.timer_armed = false;
                    break;
                }
            }
        });
    }
}

impl BatcherInner {
    /// Run one request to completion.
    ///
    /// Failures resolve only this request's slot; siblings in the same
    /// window are unaffected.
    async fn run_one(inner: Arc<BatcherInner>, request: PendingRequest) {
        let request_bytes = request.endpoint.len()
            + request
                .params
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>();

        let started = Instant::now();
        let result = if inner.offline.load(AtomicOrdering::Acquire) {
            Err(FetchError::Offline)
        } else {
            inner.metrics.record_dispatch(request_bytes);
            inner.fetcher.fetch(&request.endpoint, &request.params).await
        };

        let latency = started.elapsed();
        let response_bytes = result.as_ref().map(|payload| payload.len()).unwrap_or(0);
        inner
            .metrics
            .record_completion(latency, response_bytes, result.is_err());

        {
            let mut queue = inner.queue.lock().unwrap();
            if result.is_ok() {
                queue.stats.completed += 1;
            } else {
                queue.stats.failed += 1;
            }
        }

        // The caller may have dropped its slot; that is not an error.
        let _ = request.slot.send(result);
    }
}
