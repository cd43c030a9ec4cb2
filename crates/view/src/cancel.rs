//! Cooperative cancellation flag for preload tasks
//!
//! A preload checks its flag after the network round-trip and before any
//! cache write, so a cancelled preload never lands a partial result in a
//! cache. Work that already reached the transport is not interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared one-way cancellation flag.
///
/// Clones observe the same underlying state; cancelling is idempotent.
#[derive(Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create a flag in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel; all clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether this flag (or any clone) has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
