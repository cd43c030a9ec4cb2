//! Memory introspection probes
//!
//! The controller never talks to a platform memory API directly; it reads
//! a [`MemoryProbe`]. One implementation reads the process's resident set
//! from the kernel, one derives usage from the caches' own accounting,
//! and one returns a fixed value for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One memory observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySample {
    /// Total bytes attributed to the process.
    pub total_used: usize,

    /// Bytes attributable to this layer's caches, when known.
    pub app_specific: usize,
}

/// Source of memory usage observations.
pub trait MemoryProbe: Send + Sync {
    /// Take one observation.
    fn sample(&self) -> MemorySample;
}

/// Probe reading the resident set size from `/proc/self/status`.
///
/// On platforms without procfs (or if the read fails) it reports zero,
/// which classifies as no pressure; pair it with a [`FootprintProbe`]
/// there.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcStatusProbe;

impl ProcStatusProbe {
    pub fn new() -> Self {
        Self
    }

    #[cfg(target_os = "linux")]
    fn resident_bytes() -> Option<usize> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
        let kb: usize = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(kb * 1024)
    }

    #[cfg(not(target_os = "linux"))]
    fn resident_bytes() -> Option<usize> {
        None
    }
}

impl MemoryProbe for ProcStatusProbe {
    fn sample(&self) -> MemorySample {
        let total_used = Self::resident_bytes().unwrap_or(0);
        MemorySample {
            total_used,
            app_specific: 0,
        }
    }
}

/// Footprint source callback: reports the current byte usage of one
/// cache or collection.
pub type FootprintSource = Arc<dyn Fn() -> usize + Send + Sync>;

/// Probe summing the self-reported footprints of registered caches.
///
/// Portable fallback when no platform probe is available, and the source
/// of the `app_specific` figure either way.
#[derive(Clone, Default)]
pub struct FootprintProbe {
    sources: Vec<FootprintSource>,
}

impl FootprintProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a footprint source.
    pub fn with_source(mut self, source: FootprintSource) -> Self {
        self.sources.push(source);
        self
    }
}

impl MemoryProbe for FootprintProbe {
    fn sample(&self) -> MemorySample {
        let used: usize = self.sources.iter().map(|source| source()).sum();
        MemorySample {
            total_used: used,
            app_specific: used,
        }
    }
}

/// Probe returning a settable fixed value. Test support.
#[derive(Clone, Default)]
pub struct FixedProbe {
    bytes: Arc<AtomicUsize>,
}

impl FixedProbe {
    pub fn new(bytes: usize) -> Self {
        Self {
            bytes: Arc::new(AtomicUsize::new(bytes)),
        }
    }

    /// Change the reported usage.
    pub fn set(&self, bytes: usize) {
        self.bytes.store(bytes, Ordering::Release);
    }
}

impl MemoryProbe for FixedProbe {
    fn sample(&self) -> MemorySample {
        let used = self.bytes.load(Ordering::Acquire);
        MemorySample {
            total_used: used,
            app_specific: used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_probe() {
        let probe = FixedProbe::new(1_000);
        assert_eq!(probe.sample().total_used, 1_000);

        probe.set(2_000);
        assert_eq!(probe.sample().total_used, 2_000);
    }

    #[test]
    fn test_footprint_probe_sums_sources() {
        let probe = FootprintProbe::new()
            .with_source(Arc::new(|| 300))
            .with_source(Arc::new(|| 700));

        let sample = probe.sample();
        assert_eq!(sample.total_used, 1_000);
        assert_eq!(sample.app_specific, 1_000);
    }

    #[test]
    fn test_proc_status_probe_does_not_panic() {
        let sample = ProcStatusProbe::new().sample();
        // On Linux this is the live resident set; elsewhere it is zero.
        let _ = sample.total_used;
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_proc_status_probe_reads_resident_set() {
        let sample = ProcStatusProbe::new().sample();
        assert!(sample.total_used > 0);
    }
}
