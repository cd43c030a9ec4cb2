//! Tiered memory-pressure controller
//!
//! Classifies sampled memory usage against a budget and, when pressure
//! rises (or the platform raises a low-memory signal), runs a fixed-order
//! cascade of cleanup steps: cheapest and least user-visible first,
//! escalating toward actions that can cause refetch stalls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::probe::{MemoryProbe, MemorySample};

/// Memory pressure tier derived from budget utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureTier {
    /// Under 70% of budget.
    Normal,
    /// 70% to 85%.
    Moderate,
    /// 85% to 95%.
    High,
    /// Above 95%.
    Critical,
}

impl PressureTier {
    /// Classify a utilization ratio (0.0 to 1.0+).
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization < 0.70 {
            PressureTier::Normal
        } else if utilization < 0.85 {
            PressureTier::Moderate
        } else if utilization < 0.95 {
            PressureTier::High
        } else {
            PressureTier::Critical
        }
    }

    /// Stable name for logs and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            PressureTier::Normal => "normal",
            PressureTier::Moderate => "moderate",
            PressureTier::High => "high",
            PressureTier::Critical => "critical",
        }
    }
}

/// One classified memory observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Total bytes attributed to the process.
    pub total_used: usize,

    /// Bytes attributable to this layer's caches, when known.
    pub app_specific: usize,

    /// Tier derived from `total_used` against the budget.
    pub tier: PressureTier,
}

/// Cleanup action invoked by the cascade.
///
/// Receives whether aggressive cleanup mode is active and returns an
/// estimate of the bytes or records it released. Cleanup is best-effort
/// and must not fail; an empty cache is a valid outcome.
pub type CleanupAction = Box<dyn Fn(bool) -> usize + Send + Sync>;

/// Named, ordered step of the cleanup cascade.
pub struct CleanupStep {
    name: &'static str,
    action: CleanupAction,
}

impl CleanupStep {
    pub fn new(name: &'static str, action: CleanupAction) -> Self {
        Self { name, action }
    }
}

/// Controller statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerStats {
    /// Observations taken.
    pub samples: u64,

    /// Cleanup cascades run.
    pub cleanups: u64,

    /// Total released across all cascade runs, as reported by the steps.
    pub total_freed: u64,
}

struct ControllerState {
    tier: PressureTier,
    aggressive: bool,
    last_sample: MemorySample,
    stats: ControllerStats,
}

/// Tiered memory-pressure controller.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use fieldside_pressure::{
///     CleanupStep, FixedProbe, MemoryPressureController, PressureTier,
/// };
///
/// let probe = FixedProbe::new(0);
/// let controller =
///     MemoryPressureController::new(Arc::new(probe.clone()), 100);
/// controller.add_step(CleanupStep::new(
///     "asset-cache",
///     Box::new(|_aggressive| 0),
/// ));
///
/// probe.set(96);
/// let stats = controller.sample_once();
/// assert_eq!(stats.tier, PressureTier::Critical);
/// ```
#[derive(Clone)]
pub struct MemoryPressureController {
    probe: Arc<dyn MemoryProbe>,
    budget: usize,
    steps: Arc<Mutex<Vec<CleanupStep>>>,
    state: Arc<Mutex<ControllerState>>,
}

impl MemoryPressureController {
    /// Create a controller reading from `probe` against a byte budget.
    pub fn new(probe: Arc<dyn MemoryProbe>, budget: usize) -> Self {
        Self {
            probe,
            budget,
            steps: Arc::new(Mutex::new(Vec::new())),
            state: Arc::new(Mutex::new(ControllerState {
                tier: PressureTier::Normal,
                aggressive: false,
                last_sample: MemorySample::default(),
                stats: ControllerStats::default(),
            })),
        }
    }

    /// Append a cleanup step. Steps run in registration order.
    pub fn add_step(&self, step: CleanupStep) {
        self.steps.lock().unwrap().push(step);
    }

    /// Take one observation, classify it, and react.
    ///
    /// A tier change into `Moderate` or above triggers the cascade;
    /// dropping back to `Normal` clears aggressive mode without running
    /// cleanup.
    pub fn sample_once(&self) -> MemoryStats {
        let sample = self.probe.sample();
        let utilization = if self.budget == 0 {
            0.0
        } else {
            sample.total_used as f64 / self.budget as f64
        };
        let tier = PressureTier::from_utilization(utilization);

        let run_cleanup = {
            let mut state = self.state.lock().unwrap();
            state.stats.samples += 1;
            state.last_sample = sample;

            let previous = state.tier;
            state.tier = tier;

            match tier {
                PressureTier::Normal => {
                    state.aggressive = false;
                    false
                }
                PressureTier::Critical => {
                    state.aggressive = true;
                    previous != tier
                }
                _ => previous != tier,
            }
        };

        if run_cleanup {
            tracing::info!(tier = tier.name(), "memory pressure tier changed");
            self.run_cascade();
        }

        MemoryStats {
            total_used: sample.total_used,
            app_specific: sample.app_specific,
            tier,
        }
    }

    /// React to an external low-memory signal.
    ///
    /// Runs the full cascade unconditionally in aggressive mode; the
    /// platform would not raise the signal lightly.
    pub fn on_low_memory_signal(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.aggressive = true;
        }
        tracing::warn!("low-memory signal received");
        self.run_cascade();
    }

    /// Opportunistic trim during a natural pause (scroll idle).
    ///
    /// Re-samples, and runs the cascade only if pressure is already at
    /// `Moderate` or above; a healthy process does nothing.
    pub fn optimize_now(&self) {
        let cleanups_before = self.stats().cleanups;
        let stats = self.sample_once();

        // sample_once already ran the cascade if the tier just changed;
        // act here only for elevated-but-steady pressure.
        if stats.tier >= PressureTier::Moderate && self.stats().cleanups == cleanups_before {
            self.run_cascade();
        }
    }

    /// Spawn the periodic sampling task.
    pub fn spawn_sampler(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                controller.sample_once();
            }
        })
    }

    /// The most recent classified observation.
    pub fn current(&self) -> MemoryStats {
        let state = self.state.lock().unwrap();
        MemoryStats {
            total_used: state.last_sample.total_used,
            app_specific: state.last_sample.app_specific,
            tier: state.tier,
        }
    }

    /// The current tier.
    pub fn tier(&self) -> PressureTier {
        self.state.lock().unwrap().tier
    }

    /// Whether aggressive cleanup mode is active.
    pub fn aggressive_mode(&self) -> bool {
        self.state.lock().unwrap().aggressive
    }

    /// The configured byte budget.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Controller statistics.
    pub fn stats(&self) -> ControllerStats {
        self.state.lock().unwrap().stats
    }

    /// Run every cleanup step in order.
    fn run_cascade(&self) {
        let aggressive = self.aggressive_mode();
        let steps = self.steps.lock().unwrap();

        let mut total_freed = 0usize;
        for step in steps.iter() {
            let freed = (step.action)(aggressive);
            total_freed += freed;
            tracing::debug!(step = step.name, freed, aggressive, "cleanup step ran");
        }
        drop(steps);

        let mut state = self.state.lock().unwrap();
        state.stats.cleanups += 1;
        state.stats.total_freed += total_freed as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FixedProbe;

    fn controller_with_probe(budget: usize) -> (MemoryPressureController, FixedProbe) {
        let probe = FixedProbe::new(0);
        let controller = MemoryPressureController::new(Arc::new(probe.clone()), budget);
        (controller, probe)
    }

    #[test]
    fn test_tier_classification() {
        assert_eq!(PressureTier::from_utilization(0.30), PressureTier::Normal);
        assert_eq!(PressureTier::from_utilization(0.69), PressureTier::Normal);
        assert_eq!(PressureTier::from_utilization(0.72), PressureTier::Moderate);
        assert_eq!(PressureTier::from_utilization(0.90), PressureTier::High);
        assert_eq!(PressureTier::from_utilization(0.96), PressureTier::Critical);
    }

    #[test]
    fn test_sample_classifies_against_budget() {
        let (controller, probe) = controller_with_probe(100);

        probe.set(72);
        assert_eq!(controller.sample_once().tier, PressureTier::Moderate);

        probe.set(96);
        assert_eq!(controller.sample_once().tier, PressureTier::Critical);

        probe.set(10);
        assert_eq!(controller.sample_once().tier, PressureTier::Normal);
    }

    #[test]
    fn test_cascade_runs_in_registration_order() {
        let (controller, probe) = controller_with_probe(100);

        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["assets", "responses", "preloads", "views", "models"] {
            let order = Arc::clone(&order);
            controller.add_step(CleanupStep::new(
                name,
                Box::new(move |_aggressive| {
                    order.lock().unwrap().push(name);
                    1
                }),
            ));
        }

        probe.set(96);
        controller.sample_once();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["assets", "responses", "preloads", "views", "models"]
        );
    }

    #[test]
    fn test_cascade_runs_once_per_tier_change() {
        let (controller, probe) = controller_with_probe(100);

        let runs = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&runs);
        controller.add_step(CleanupStep::new(
            "count",
            Box::new(move |_| {
                *counter.lock().unwrap() += 1;
                0
            }),
        ));

        probe.set(90);
        controller.sample_once();
        assert_eq!(*runs.lock().unwrap(), 1);

        // Steady state at the same tier: no repeat.
        controller.sample_once();
        controller.sample_once();
        assert_eq!(*runs.lock().unwrap(), 1);

        // Escalation runs it again.
        probe.set(97);
        controller.sample_once();
        assert_eq!(*runs.lock().unwrap(), 2);
    }

    #[test]
    fn test_recovery_to_normal_skips_cleanup() {
        let (controller, probe) = controller_with_probe(100);

        let runs = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&runs);
        controller.add_step(CleanupStep::new(
            "count",
            Box::new(move |_| {
                *counter.lock().unwrap() += 1;
                0
            }),
        ));

        probe.set(90);
        controller.sample_once();
        assert_eq!(*runs.lock().unwrap(), 1);

        probe.set(10);
        controller.sample_once();
        assert_eq!(*runs.lock().unwrap(), 1);
        assert_eq!(controller.tier(), PressureTier::Normal);
        assert!(!controller.aggressive_mode());
    }

    #[test]
    fn test_critical_enables_aggressive_mode() {
        let (controller, probe) = controller_with_probe(100);

        let saw_aggressive = Arc::new(Mutex::new(None));
        let observed = Arc::clone(&saw_aggressive);
        controller.add_step(CleanupStep::new(
            "observe",
            Box::new(move |aggressive| {
                *observed.lock().unwrap() = Some(aggressive);
                0
            }),
        ));

        probe.set(96);
        controller.sample_once();

        assert!(controller.aggressive_mode());
        assert_eq!(*saw_aggressive.lock().unwrap(), Some(true));

        // Back to normal clears the mode.
        probe.set(10);
        controller.sample_once();
        assert!(!controller.aggressive_mode());
    }

    #[test]
    fn test_low_memory_signal_forces_cascade() {
        let (controller, probe) = controller_with_probe(100);

        let runs = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&runs);
        controller.add_step(CleanupStep::new(
            "count",
            Box::new(move |_| {
                *counter.lock().unwrap() += 1;
                0
            }),
        ));

        // Healthy memory, but the platform says otherwise.
        probe.set(10);
        controller.sample_once();
        controller.on_low_memory_signal();

        assert_eq!(*runs.lock().unwrap(), 1);
        assert!(controller.aggressive_mode());
    }

    #[test]
    fn test_optimize_now_only_acts_under_pressure() {
        let (controller, probe) = controller_with_probe(100);

        let runs = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&runs);
        controller.add_step(CleanupStep::new(
            "count",
            Box::new(move |_| {
                *counter.lock().unwrap() += 1;
                0
            }),
        ));

        probe.set(10);
        controller.optimize_now();
        assert_eq!(*runs.lock().unwrap(), 0);

        // Establish steady moderate pressure (tier-change cleanup fires
        // once), then a scroll-pause trim fires again.
        probe.set(80);
        controller.sample_once();
        assert_eq!(*runs.lock().unwrap(), 1);
        controller.optimize_now();
        assert_eq!(*runs.lock().unwrap(), 2);
    }

    #[test]
    fn test_stats_accumulate() {
        let (controller, probe) = controller_with_probe(100);

        controller.add_step(CleanupStep::new("freer", Box::new(|_| 128)));

        probe.set(90);
        controller.sample_once();
        probe.set(10);
        controller.sample_once();

        let stats = controller.stats();
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.cleanups, 1);
        assert_eq!(stats.total_freed, 128);
    }

    #[test]
    fn test_zero_budget_reads_as_normal() {
        let (controller, probe) = controller_with_probe(0);
        probe.set(1_000_000);
        assert_eq!(controller.sample_once().tier, PressureTier::Normal);
    }

    #[tokio::test]
    async fn test_sampler_task_classifies_periodically() {
        let (controller, probe) = controller_with_probe(100);
        probe.set(96);

        let handle = controller.spawn_sampler(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();

        assert_eq!(controller.tier(), PressureTier::Critical);
        assert!(controller.stats().samples >= 1);
    }
}
