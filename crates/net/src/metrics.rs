//! Request throughput and latency accounting
//!
//! Observational metrics for the diagnostics view and the connectivity
//! monitor. Nothing in the batching path reads these values to make
//! control decisions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Window used for the requests-per-minute rate.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Point-in-time view of the network metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkMetricsSnapshot {
    /// Requests completed within the last minute.
    pub requests_per_minute: u64,

    /// Mean latency across all completed requests.
    pub average_latency: Duration,

    /// Estimated request bytes handed to the transport.
    pub bytes_sent: u64,

    /// Payload bytes received from the transport.
    pub bytes_received: u64,

    /// Fraction of completed requests that failed (0.0 to 1.0).
    pub error_rate: f64,

    /// Total requests completed (successes and failures).
    pub completed: u64,
}

struct MetricsState {
    recent: VecDeque<Instant>,
    completed: u64,
    failed: u64,
    total_latency: Duration,
    bytes_sent: u64,
    bytes_received: u64,
}

impl MetricsState {
    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.recent.front() {
            if now.duration_since(front) > RATE_WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Shared request metrics recorder.
#[derive(Clone)]
pub struct NetworkMetrics {
    state: Arc<Mutex<MetricsState>>,
}

impl NetworkMetrics {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MetricsState {
                recent: VecDeque::new(),
                completed: 0,
                failed: 0,
                total_latency: Duration::ZERO,
                bytes_sent: 0,
                bytes_received: 0,
            })),
        }
    }

    /// Record a request handed to the transport.
    pub fn record_dispatch(&self, request_bytes: usize) {
        let mut state = self.state.lock().unwrap();
        state.bytes_sent += request_bytes as u64;
    }

    /// Record a completed request, successful or not.
    pub fn record_completion(&self, latency: Duration, response_bytes: usize, failed: bool) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        state.prune(now);
        state.recent.push_back(now);
        state.completed += 1;
        if failed {
            state.failed += 1;
        }
        state.total_latency += latency;
        state.bytes_received += response_bytes as u64;
    }

    /// Capture a snapshot of the current values.
    pub fn snapshot(&self) -> NetworkMetricsSnapshot {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        state.prune(now);

        let average_latency = if state.completed == 0 {
            Duration::ZERO
        } else {
            state.total_latency / state.completed as u32
        };
        let error_rate = if state.completed == 0 {
            0.0
        } else {
            state.failed as f64 / state.completed as f64
        };

        NetworkMetricsSnapshot {
            requests_per_minute: state.recent.len() as u64,
            average_latency,
            bytes_sent: state.bytes_sent,
            bytes_received: state.bytes_received,
            error_rate,
            completed: state.completed,
        }
    }
}

impl Default for NetworkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let metrics = NetworkMetrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.requests_per_minute, 0);
        assert_eq!(snapshot.average_latency, Duration::ZERO);
        assert_eq!(snapshot.error_rate, 0.0);
    }

    #[test]
    fn test_completion_accounting() {
        let metrics = NetworkMetrics::new();

        metrics.record_dispatch(100);
        metrics.record_completion(Duration::from_millis(40), 2_000, false);
        metrics.record_dispatch(50);
        metrics.record_completion(Duration::from_millis(80), 0, true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_per_minute, 2);
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.average_latency, Duration::from_millis(60));
        assert_eq!(snapshot.bytes_sent, 150);
        assert_eq!(snapshot.bytes_received, 2_000);
        assert!((snapshot.error_rate - 0.5).abs() < f64::EPSILON);
    }
}
