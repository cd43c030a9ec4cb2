//! Read-only diagnostics snapshot
//!
//! Aggregates statistics from every component of the layer into one
//! serializable value the diagnostics screen can render. Collecting a
//! snapshot never mutates component state.

use serde::Serialize;

use fieldside_cache::{AssetCache, ResponseCache};
use fieldside_net::{Connectivity, NetworkConditionMonitor, RequestBatcher};
use fieldside_pressure::MemoryPressureController;
use fieldside_view::{PredictivePreloader, ViewportVirtualizer};

/// Asset cache section.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AssetCacheSnapshot {
    pub entries: usize,
    pub bytes_used: usize,
    pub byte_limit: usize,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
}

/// Response cache section.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResponseCacheSnapshot {
    pub entries: usize,
    pub bytes_used: usize,
    pub hit_rate: f64,
    pub revalidations_signalled: u64,
    pub revalidations_completed: u64,
    pub stale_invalidations: u64,
}

/// Request batcher and transport metrics section.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RequestSnapshot {
    pub pending: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub requests_per_minute: u64,
    pub average_latency_ms: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error_rate: f64,
}

/// Connectivity section.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSnapshot {
    pub connectivity: &'static str,
    pub level: &'static str,
}

/// Memory pressure section.
#[derive(Debug, Clone, Serialize)]
pub struct MemorySnapshot {
    pub total_used: usize,
    pub app_specific: usize,
    pub budget: usize,
    pub tier: &'static str,
    pub aggressive_mode: bool,
    pub cleanups: u64,
}

/// Virtualizer section.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VirtualizerSnapshot {
    pub tracked: usize,
    pub visible: usize,
    pub preload_hints: u64,
    pub purged: u64,
}

/// Preloader section.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PreloaderSnapshot {
    pub predictions: u64,
    pub preloads_issued: u64,
    pub preloads_cancelled: u64,
    pub preloads_stored: u64,
    pub pending: usize,
}

/// Complete diagnostics snapshot of the performance layer.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsSnapshot {
    pub asset_cache: AssetCacheSnapshot,
    pub response_cache: ResponseCacheSnapshot,
    pub requests: RequestSnapshot,
    pub network: NetworkSnapshot,
    pub memory: MemorySnapshot,
    pub virtualizer: VirtualizerSnapshot,
    pub preloader: PreloaderSnapshot,
}

impl DiagnosticsSnapshot {
    /// Collect a snapshot from the layer's components.
    pub fn collect(
        assets: &AssetCache,
        responses: &ResponseCache,
        batcher: &RequestBatcher,
        monitor: &NetworkConditionMonitor,
        controller: &MemoryPressureController,
        virtualizer: &ViewportVirtualizer,
        preloader: &PredictivePreloader,
    ) -> Self {
        let asset_stats = assets.stats();
        let response_stats = responses.stats();
        let batcher_stats = batcher.stats();
        let metrics = batcher.metrics().snapshot();
        let memory = controller.current();
        let controller_stats = controller.stats();
        let virt_stats = virtualizer.stats();
        let preload_stats = preloader.stats();

        Self {
            asset_cache: AssetCacheSnapshot {
                entries: asset_stats.entry_count,
                bytes_used: asset_stats.size_used,
                byte_limit: asset_stats.size_limit,
                hit_rate: asset_stats.hit_rate(),
                evictions: asset_stats.evictions,
                expirations: asset_stats.expirations,
            },
            response_cache: ResponseCacheSnapshot {
                entries: response_stats.store.entry_count,
                bytes_used: response_stats.store.size_used,
                hit_rate: response_stats.store.hit_rate(),
                revalidations_signalled: response_stats.revalidations_signalled,
                revalidations_completed: response_stats.revalidations_completed,
                stale_invalidations: response_stats.stale_invalidations,
            },
            requests: RequestSnapshot {
                pending: batcher_stats.pending,
                submitted: batcher_stats.submitted,
                completed: batcher_stats.completed,
                failed: batcher_stats.failed,
                cancelled: batcher_stats.cancelled,
                requests_per_minute: metrics.requests_per_minute,
                average_latency_ms: metrics.average_latency.as_millis() as u64,
                bytes_sent: metrics.bytes_sent,
                bytes_received: metrics.bytes_received,
                error_rate: metrics.error_rate,
            },
            network: NetworkSnapshot {
                connectivity: connectivity_name(monitor.connectivity()),
                level: monitor.level().name(),
            },
            memory: MemorySnapshot {
                total_used: memory.total_used,
                app_specific: memory.app_specific,
                budget: controller.budget(),
                tier: memory.tier.name(),
                aggressive_mode: controller.aggressive_mode(),
                cleanups: controller_stats.cleanups,
            },
            virtualizer: VirtualizerSnapshot {
                tracked: virt_stats.tracked,
                visible: virt_stats.visible,
                preload_hints: virt_stats.preload_hints,
                purged: virt_stats.purged,
            },
            preloader: PreloaderSnapshot {
                predictions: preload_stats.predictions,
                preloads_issued: preload_stats.preloads_issued,
                preloads_cancelled: preload_stats.preloads_cancelled,
                preloads_stored: preload_stats.preloads_stored,
                pending: preloader.pending_len(),
            },
        }
    }
}

fn connectivity_name(connectivity: Connectivity) -> &'static str {
    match connectivity {
        Connectivity::Unknown => "unknown",
        Connectivity::Offline => "offline",
        Connectivity::Cellular => "cellular",
        Connectivity::Wifi => "wifi",
        Connectivity::Ethernet => "ethernet",
    }
}
