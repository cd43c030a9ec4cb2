//! Connectivity monitoring and optimization profile selection
//!
//! Watches connectivity observations and derives the active optimization
//! level, reconfiguring the request batcher and the response cache on
//! every transition. Profile changes are forward-looking: cached entries
//! keep the TTL they were stored under.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use fieldside_cache::{CacheStrategy, ResponseCache};

use crate::batcher::{BatchProfile, RequestBatcher};

/// Observed connectivity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Unknown,
    Offline,
    Cellular,
    Wifi,
    Ethernet,
}

/// Named optimization level derived from connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptimizationLevel {
    /// Maximize reliance on cached data; minimize network activity.
    /// Active while offline or before connectivity is known.
    Aggressive,

    /// Normal operation on unmetered, reliable links.
    Balanced,

    /// Short-lived caching and narrow dispatch windows for metered
    /// connections.
    Conservative,
}

impl OptimizationLevel {
    /// Level mandated by a connectivity observation.
    pub fn for_connectivity(connectivity: Connectivity) -> Self {
        match connectivity {
            Connectivity::Wifi | Connectivity::Ethernet => OptimizationLevel::Balanced,
            Connectivity::Cellular => OptimizationLevel::Conservative,
            Connectivity::Offline | Connectivity::Unknown => OptimizationLevel::Aggressive,
        }
    }

    /// Stable name for logs and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            OptimizationLevel::Aggressive => "aggressive",
            OptimizationLevel::Balanced => "balanced",
            OptimizationLevel::Conservative => "conservative",
        }
    }
}

/// Complete profile applied when a level becomes active.
///
/// Always swapped as one value so consumers never observe a torn mix of
/// two profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationProfile {
    /// The level this profile belongs to.
    pub level: OptimizationLevel,

    /// Batcher window width and debounce delay.
    pub batch: BatchProfile,

    /// TTL/stale policy for new response-cache inserts.
    pub cache_strategy: CacheStrategy,
}

/// The three profiles the monitor switches between.
#[derive(Debug, Clone, Copy)]
pub struct ProfileTable {
    pub aggressive: OptimizationProfile,
    pub balanced: OptimizationProfile,
    pub conservative: OptimizationProfile,
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self {
            aggressive: OptimizationProfile {
                level: OptimizationLevel::Aggressive,
                batch: BatchProfile {
                    max_concurrent_requests: 1,
                    batching_delay: Duration::from_millis(1_000),
                },
                cache_strategy: CacheStrategy::new(
                    Duration::from_secs(30 * 60),
                    Duration::from_secs(15 * 60),
                ),
            },
            balanced: OptimizationProfile {
                level: OptimizationLevel::Balanced,
                batch: BatchProfile {
                    max_concurrent_requests: 6,
                    batching_delay: Duration::from_millis(100),
                },
                cache_strategy: CacheStrategy::new(
                    Duration::from_secs(5 * 60),
                    Duration::from_secs(150),
                ),
            },
            conservative: OptimizationProfile {
                level: OptimizationLevel::Conservative,
                batch: BatchProfile {
                    max_concurrent_requests: 2,
                    batching_delay: Duration::from_millis(400),
                },
                cache_strategy: CacheStrategy::new(
                    Duration::from_secs(60),
                    Duration::from_secs(30),
                ),
            },
        }
    }
}

impl ProfileTable {
    /// Profile for a level.
    pub fn profile(&self, level: OptimizationLevel) -> OptimizationProfile {
        match level {
            OptimizationLevel::Aggressive => self.aggressive,
            OptimizationLevel::Balanced => self.balanced,
            OptimizationLevel::Conservative => self.conservative,
        }
    }
}

struct MonitorState {
    connectivity: Connectivity,
    level: OptimizationLevel,
    forced: bool,
    batcher: Option<RequestBatcher>,
    responses: Option<ResponseCache>,
}

/// Connectivity state machine driving profile selection.
///
/// # Example
///
/// ```
/// use fieldside_net::{Connectivity, NetworkConditionMonitor, OptimizationLevel};
///
/// let monitor = NetworkConditionMonitor::new();
/// assert_eq!(monitor.level(), OptimizationLevel::Aggressive);
///
/// monitor.observe(Connectivity::Wifi);
/// assert_eq!(monitor.level(), OptimizationLevel::Balanced);
/// ```
#[derive(Clone)]
pub struct NetworkConditionMonitor {
    state: Arc<Mutex<MonitorState>>,
    table: ProfileTable,
    tx: Arc<watch::Sender<OptimizationProfile>>,
}

impl NetworkConditionMonitor {
    /// Create a monitor with the default profile table.
    ///
    /// Starts at `Unknown` connectivity, i.e. the aggressive level.
    pub fn new() -> Self {
        Self::with_table(ProfileTable::default())
    }

    /// Create a monitor with a custom profile table.
    pub fn with_table(table: ProfileTable) -> Self {
        let initial = table.profile(OptimizationLevel::Aggressive);
        let (tx, _rx) = watch::channel(initial);
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                connectivity: Connectivity::Unknown,
                level: OptimizationLevel::Aggressive,
                forced: false,
                batcher: None,
                responses: None,
            })),
            table,
            tx: Arc::new(tx),
        }
    }

    /// Attach the components this monitor reconfigures.
    ///
    /// The current profile is applied to both immediately.
    pub fn attach(&self, batcher: RequestBatcher, responses: ResponseCache) {
        let level = {
            let mut state = self.state.lock().unwrap();
            state.batcher = Some(batcher);
            state.responses = Some(responses);
            state.level
        };
        self.apply(level);
    }

    /// Feed one connectivity observation into the state machine.
    ///
    /// Clears any forced level. Reconfigures the attached components when
    /// the derived level differs from the active one.
    pub fn observe(&self, connectivity: Connectivity) {
        let derived = OptimizationLevel::for_connectivity(connectivity);

        let (changed, batcher) = {
            let mut state = self.state.lock().unwrap();
            state.connectivity = connectivity;
            let changed = state.forced || state.level != derived;
            state.forced = false;
            state.level = derived;
            (changed, state.batcher.clone())
        };

        // Offline is tracked independently of the level so that an
        // unknown-to-offline flip (both aggressive) still fails requests
        // fast.
        if let Some(batcher) = batcher {
            batcher.set_offline(connectivity == Connectivity::Offline);
        }

        if changed {
            tracing::info!(
                level = derived.name(),
                ?connectivity,
                "optimization level changed"
            );
            self.apply(derived);
        }
    }

    /// Force a level until the next connectivity observation.
    ///
    /// Diagnostic override; does not touch the offline flag.
    pub fn force_level(&self, level: OptimizationLevel) {
        {
            let mut state = self.state.lock().unwrap();
            state.forced = true;
            state.level = level;
        }
        tracing::info!(level = level.name(), "optimization level forced");
        self.apply(level);
    }

    /// Subscribe to profile changes.
    ///
    /// The receiver immediately holds the current profile.
    pub fn subscribe(&self) -> watch::Receiver<OptimizationProfile> {
        self.tx.subscribe()
    }

    /// Spawn a task forwarding connectivity events from a channel.
    ///
    /// This is the seam for the platform's connectivity-change event
    /// source.
    pub fn spawn_listener(
        &self,
        mut events: mpsc::Receiver<Connectivity>,
    ) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            while let Some(connectivity) = events.recv().await {
                monitor.observe(connectivity);
            }
        })
    }

    /// The currently active level.
    pub fn level(&self) -> OptimizationLevel {
        self.state.lock().unwrap().level
    }

    /// The last observed connectivity.
    pub fn connectivity(&self) -> Connectivity {
        self.state.lock().unwrap().connectivity
    }

    /// The profile for the currently active level.
    pub fn current_profile(&self) -> OptimizationProfile {
        self.table.profile(self.level())
    }

    /// Apply a level's profile to the attached components and publish it.
    fn apply(&self, level: OptimizationLevel) {
        let profile = self.table.profile(level);

        let (batcher, responses) = {
            let state = self.state.lock().unwrap();
            (state.batcher.clone(), state.responses.clone())
        };

        if let Some(batcher) = batcher {
            batcher.reconfigure(profile.batch);
        }
        if let Some(responses) = responses {
            responses.set_strategy(profile.cache_strategy);
        }

        // Publishing only fails when no subscriber exists, which is fine.
        let _ = self.tx.send(profile);
    }
}

impl Default for NetworkConditionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchFuture;

    fn noop_fetcher() -> Arc<dyn crate::fetch::Fetcher> {
        Arc::new(|_: &str, _: &[(String, String)]| -> FetchFuture {
            Box::pin(async { Ok(Arc::from(b"".as_ref())) })
        })
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(
            OptimizationLevel::for_connectivity(Connectivity::Wifi),
            OptimizationLevel::Balanced
        );
        assert_eq!(
            OptimizationLevel::for_connectivity(Connectivity::Ethernet),
            OptimizationLevel::Balanced
        );
        assert_eq!(
            OptimizationLevel::for_connectivity(Connectivity::Cellular),
            OptimizationLevel::Conservative
        );
        assert_eq!(
            OptimizationLevel::for_connectivity(Connectivity::Offline),
            OptimizationLevel::Aggressive
        );
        assert_eq!(
            OptimizationLevel::for_connectivity(Connectivity::Unknown),
            OptimizationLevel::Aggressive
        );
    }

    #[tokio::test]
    async fn test_transition_reconfigures_batcher_and_cache() {
        let monitor = NetworkConditionMonitor::new();
        let batcher = RequestBatcher::new(noop_fetcher());
        let responses = ResponseCache::new(1024 * 1024);

        monitor.attach(batcher.clone(), responses.clone());

        // Attaching applies the aggressive (startup) profile.
        let aggressive = ProfileTable::default().aggressive;
        assert_eq!(batcher.profile(), aggressive.batch);
        assert_eq!(responses.strategy(), aggressive.cache_strategy);

        monitor.observe(Connectivity::Wifi);
        let balanced = ProfileTable::default().balanced;
        assert_eq!(batcher.profile(), balanced.batch);
        assert_eq!(responses.strategy(), balanced.cache_strategy);

        monitor.observe(Connectivity::Cellular);
        let conservative = ProfileTable::default().conservative;
        assert_eq!(batcher.profile(), conservative.batch);
        assert_eq!(responses.strategy(), conservative.cache_strategy);
    }

    #[tokio::test]
    async fn test_offline_flag_follows_connectivity() {
        let monitor = NetworkConditionMonitor::new();
        let batcher = RequestBatcher::new(noop_fetcher());
        monitor.attach(batcher.clone(), ResponseCache::new(1024));

        monitor.observe(Connectivity::Offline);
        assert!(batcher.is_offline());

        // Unknown is also aggressive, but it is not offline.
        monitor.observe(Connectivity::Unknown);
        assert!(!batcher.is_offline());
    }

    #[tokio::test]
    async fn test_subscribers_see_profile_changes() {
        let monitor = NetworkConditionMonitor::new();
        let mut rx = monitor.subscribe();

        assert_eq!(rx.borrow().level, OptimizationLevel::Aggressive);

        monitor.observe(Connectivity::Wifi);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().level, OptimizationLevel::Balanced);
    }

    #[test]
    fn test_forced_level_cleared_by_next_observation() {
        let monitor = NetworkConditionMonitor::new();
        monitor.observe(Connectivity::Wifi);

        monitor.force_level(OptimizationLevel::Conservative);
        assert_eq!(monitor.level(), OptimizationLevel::Conservative);

        monitor.observe(Connectivity::Wifi);
        assert_eq!(monitor.level(), OptimizationLevel::Balanced);
    }

    #[tokio::test]
    async fn test_listener_task_forwards_events() {
        let monitor = NetworkConditionMonitor::new();
        let (tx, rx) = mpsc::channel(4);
        let handle = monitor.spawn_listener(rx);

        tx.send(Connectivity::Cellular).await.unwrap();
        // Give the forwarding task a turn.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(monitor.level(), OptimizationLevel::Conservative);
        assert_eq!(monitor.connectivity(), Connectivity::Cellular);

        drop(tx);
        let _ = handle.await;
    }

    #[test]
    fn test_repeat_observation_is_quiet() {
        let monitor = NetworkConditionMonitor::new();
        monitor.observe(Connectivity::Wifi);
        let level_before = monitor.level();

        monitor.observe(Connectivity::Ethernet);
        assert_eq!(monitor.level(), level_before);
    }
}
