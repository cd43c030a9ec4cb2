//! Generic size-bounded cache store with TTL and scored eviction
//!
//! Provides the shared cache primitive used by the asset and response
//! caches. Entries carry a time-to-live and an importance tier; when the
//! configured size budget is exceeded, the lowest-scoring entries are
//! evicted until usage drops back under a headroom target.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Importance tier assigned to an entry at store time.
///
/// Importance scales the eviction score: a `Critical` entry must be
/// substantially colder than a `Low` entry before it is chosen for
/// eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Importance {
    Low,
    Normal,
    High,
    Critical,
}

impl Importance {
    /// Multiplier applied to the eviction score.
    pub fn multiplier(self) -> f64 {
        match self {
            Importance::Low => 0.5,
            Importance::Normal => 1.0,
            Importance::High => 2.0,
            Importance::Critical => 4.0,
        }
    }
}

/// Window over which the recency factor decays to its floor.
const RECENCY_DECAY_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Floor for the recency factor; entries never score below
/// `frequency * RECENCY_FLOOR * importance`.
const RECENCY_FLOOR: f64 = 0.1;

/// Fraction of the size budget that eviction drives usage down to.
/// Leaving headroom avoids re-evicting on every subsequent insert.
const EVICTION_HEADROOM: f64 = 0.80;

/// Multiplier applied to entry frequencies on each decay pass.
const FREQUENCY_DECAY: f64 = 0.5;

/// Statistics about store usage
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    /// Number of entries currently stored
    pub entry_count: usize,

    /// Total estimated size of stored entries (bytes)
    pub size_used: usize,

    /// Maximum total size allowed (bytes)
    pub size_limit: usize,

    /// Number of successful retrievals
    pub hits: u64,

    /// Number of missed retrievals (absent or expired)
    pub misses: u64,

    /// Number of entries evicted to stay within the size budget
    pub evictions: u64,

    /// Number of entries removed because their TTL lapsed
    pub expirations: u64,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate size utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.size_limit == 0 {
            0.0
        } else {
            self.size_used as f64 / self.size_limit as f64
        }
    }
}

/// Read-only view of an entry's bookkeeping metadata.
#[derive(Debug, Clone, Copy)]
pub struct EntryInfo {
    /// Time since the entry was stored
    pub age: Duration,

    /// Time since the entry was last retrieved (or stored, if never hit)
    pub idle: Duration,

    /// Number of successful retrievals
    pub access_count: u64,

    /// Estimated size in bytes
    pub size_estimate: usize,

    /// Importance tier assigned at store time
    pub importance: Importance,
}

struct Entry<V> {
    payload: V,
    created_at: Instant,
    ttl: Duration,
    size_estimate: usize,
    access_count: u64,
    last_accessed: Instant,
    importance: Importance,
    frequency: f64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }

    /// Composite eviction score: frequency x recency x importance.
    ///
    /// The recency factor decays linearly from 1.0 to a floor of 0.1 over
    /// a one-hour idle window, so cold entries rank below hot ones even
    /// when their lifetime access counts are similar.
    fn eviction_score(&self, now: Instant) -> f64 {
        let idle = now.duration_since(self.last_accessed);
        let fraction =
            (idle.as_secs_f64() / RECENCY_DECAY_WINDOW.as_secs_f64()).min(1.0);
        let recency_factor = 1.0 - fraction * (1.0 - RECENCY_FLOOR);
        self.frequency * recency_factor * self.importance.multiplier()
    }
}

struct StoreState<K, V> {
    entries: HashMap<K, Entry<V>>,
    size_used: usize,
    size_limit: usize,
    stats: StoreStats,
}

impl<K: Eq + Hash + Clone, V> StoreState<K, V> {
    fn new(size_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            size_used: 0,
            size_limit,
            stats: StoreStats {
                size_limit,
                ..Default::default()
            },
        }
    }

    fn remove_entry(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.size_used = self.size_used.saturating_sub(entry.size_estimate);
        self.sync_stats();
        Some(entry)
    }

    /// Evict lowest-scoring entries until usage is at or below `target`.
    fn evict_to(&mut self, target: usize, now: Instant) {
        if self.size_used <= target {
            return;
        }

        let mut ranked: Vec<(K, f64)> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.eviction_score(now)))
            .collect();
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        for (key, _score) in ranked {
            if self.size_used <= target {
                break;
            }
            if self.remove_entry(&key).is_some() {
                self.stats.evictions += 1;
            }
        }
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.size_used = self.size_used;
        self.stats.size_limit = self.size_limit;
    }
}

/// Generic size-bounded cache with TTL expiry and scored eviction.
///
/// Thread-safe key/value store whose total estimated size never exceeds
/// the configured limit once an insert completes. Retrieval treats
/// expired entries as absent and removes them on touch; a periodic sweep
/// removes expired entries that are never re-touched.
///
/// Eviction order is determined by a composite score
/// (access frequency x recency x importance tier); the lowest-scoring
/// entries are removed first, down to 80% of the limit so consecutive
/// inserts do not immediately re-trigger eviction.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use fieldside_cache::{CacheStore, Importance};
///
/// let store: CacheStore<String, Vec<u8>> = CacheStore::new(1024 * 1024);
///
/// store.store(
///     "players/412".to_string(),
///     vec![0u8; 512],
///     Duration::from_secs(300),
///     Importance::Normal,
/// );
///
/// assert!(store.retrieve(&"players/412".to_string()).is_some());
/// ```
pub struct CacheStore<K, V> {
    state: Arc<Mutex<StoreState<K, V>>>,
}

impl<K, V> Clone for CacheStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new store with the given size limit in bytes.
    pub fn new(size_limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::new(size_limit))),
        }
    }

    /// Store an entry, overwriting any existing entry for the key.
    ///
    /// The entry's size is estimated as the payload type's inline size;
    /// use [`CacheStore::store_sized`] when the payload owns heap data.
    /// Triggers eviction if the new total exceeds the size limit.
    pub fn store(&self, key: K, payload: V, ttl: Duration, importance: Importance) {
        let size = std::mem::size_of::<V>();
        self.store_sized(key, payload, size, ttl, importance);
    }

    /// Store an entry with an explicit size estimate in bytes.
    ///
    /// An entry larger than the entire size limit is refused outright:
    /// accepting it could never satisfy the budget invariant.
    pub fn store_sized(
        &self,
        key: K,
        payload: V,
        size_estimate: usize,
        ttl: Duration,
        importance: Importance,
    ) {
        let mut state = self.state.lock().unwrap();

        if size_estimate > state.size_limit {
            tracing::debug!(
                size = size_estimate,
                limit = state.size_limit,
                "refusing entry larger than the cache budget"
            );
            return;
        }

        let now = Instant::now();

        // Replace-in-place: drop the old entry's size before sizing the new
        // total.
        state.remove_entry(&key);

        if state.size_used + size_estimate > state.size_limit {
            let target =
                ((state.size_limit as f64) * EVICTION_HEADROOM) as usize;
            let target = target.min(state.size_limit.saturating_sub(size_estimate));
            state.evict_to(target, now);
        }

        state.size_used += size_estimate;
        state.entries.insert(
            key,
            Entry {
                payload,
                created_at: now,
                ttl,
                size_estimate,
                access_count: 0,
                last_accessed: now,
                importance,
                frequency: 1.0,
            },
        );
        state.sync_stats();
    }

    /// Retrieve an entry's payload.
    ///
    /// Returns `None` if the key is absent or the entry's TTL has lapsed;
    /// expired entries are removed as a side effect. A hit increments the
    /// access count, refreshes the last-accessed timestamp, and bumps the
    /// entry's frequency component.
    pub fn retrieve(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        match state.entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                state.remove_entry(key);
                state.stats.expirations += 1;
                state.stats.misses += 1;
                None
            }
            Some(entry) => {
                entry.access_count += 1;
                entry.last_accessed = now;
                entry.frequency += 1.0;
                let payload = entry.payload.clone();
                state.stats.hits += 1;
                Some(payload)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Clone a live entry's payload without touching access bookkeeping.
    ///
    /// Unlike [`CacheStore::retrieve`] this neither counts as a hit nor
    /// refreshes recency; expired entries read as `None` but are left for
    /// the sweeper.
    pub fn peek(&self, key: &K) -> Option<V> {
        let state = self.state.lock().unwrap();
        let now = Instant::now();
        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.payload.clone())
    }

    /// Check for a live (non-expired) entry without touching access
    /// bookkeeping.
    pub fn contains(&self, key: &K) -> bool {
        let state = self.state.lock().unwrap();
        let now = Instant::now();
        state
            .entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Remove an entry. Returns its payload if it was present.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock().unwrap();
        state.remove_entry(key).map(|entry| entry.payload)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.size_used = 0;
        state.sync_stats();
    }

    /// Remove entries whose TTL has lapsed, regardless of whether they
    /// were ever re-touched. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        let expired: Vec<K> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove_entry(key);
            state.stats.expirations += 1;
        }

        expired.len()
    }

    /// Halve every entry's frequency component.
    ///
    /// Run periodically so that a burst of historical accesses does not
    /// pin an entry in the cache forever.
    pub fn decay_frequencies(&self) {
        let mut state = self.state.lock().unwrap();
        for entry in state.entries.values_mut() {
            entry.frequency *= FREQUENCY_DECAY;
        }
    }

    /// Remove every entry whose last access is older than `window`.
    ///
    /// Bypasses eviction scoring entirely; used for bulk purges under
    /// memory pressure. Returns `(entries_removed, bytes_freed)`.
    pub fn retain_accessed_within(&self, window: Duration) -> (usize, usize) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        let cold: Vec<K> = state
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_accessed) > window)
            .map(|(key, _)| key.clone())
            .collect();

        let mut bytes = 0;
        for key in &cold {
            if let Some(entry) = state.remove_entry(key) {
                bytes += entry.size_estimate;
                state.stats.evictions += 1;
            }
        }

        (cold.len(), bytes)
    }

    /// Remove every entry matching the predicate.
    ///
    /// The predicate sees the entry's metadata and payload. Returns
    /// `(entries_removed, bytes_freed)`.
    pub fn remove_where<F>(&self, predicate: F) -> (usize, usize)
    where
        F: Fn(&K, &EntryInfo, &V) -> bool,
    {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        let doomed: Vec<K> = state
            .entries
            .iter()
            .filter(|(key, entry)| {
                let info = EntryInfo {
                    age: now.duration_since(entry.created_at),
                    idle: now.duration_since(entry.last_accessed),
                    access_count: entry.access_count,
                    size_estimate: entry.size_estimate,
                    importance: entry.importance,
                };
                predicate(key, &info, &entry.payload)
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut bytes = 0;
        for key in &doomed {
            if let Some(entry) = state.remove_entry(key) {
                bytes += entry.size_estimate;
                state.stats.evictions += 1;
            }
        }

        (doomed.len(), bytes)
    }

    /// Read an entry's bookkeeping metadata without touching it.
    ///
    /// Returns `None` for absent or expired entries.
    pub fn entry_info(&self, key: &K) -> Option<EntryInfo> {
        let state = self.state.lock().unwrap();
        let now = Instant::now();
        let entry = state.entries.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        Some(EntryInfo {
            age: now.duration_since(entry.created_at),
            idle: now.duration_since(entry.last_accessed),
            access_count: entry.access_count,
            size_estimate: entry.size_estimate,
            importance: entry.importance,
        })
    }

    /// Update the size limit, evicting down to the headroom target if the
    /// new limit is smaller than current usage.
    pub fn set_size_limit(&self, new_limit: usize) {
        let mut state = self.state.lock().unwrap();
        state.size_limit = new_limit;
        if state.size_used > new_limit {
            let target = ((new_limit as f64) * EVICTION_HEADROOM) as usize;
            state.evict_to(target, Instant::now());
        }
        state.sync_stats();
    }

    /// Number of entries currently stored (including not-yet-swept
    /// expired entries).
    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.entries.len()
    }

    /// Check whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total estimated size of stored entries in bytes.
    pub fn size_used(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.size_used
    }

    /// Configured size limit in bytes.
    pub fn size_limit(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.size_limit
    }

    /// Current usage statistics.
    pub fn stats(&self) -> StoreStats {
        let state = self.state.lock().unwrap();
        state.stats
    }
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Spawn a background task that sweeps expired entries and decays
    /// frequencies every `interval`.
    ///
    /// The task runs until aborted; callers keep the handle and abort it
    /// on shutdown.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the first
            // sweep happens one full interval after startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let swept = store.sweep_expired();
                store.decay_frequencies();
                if swept > 0 {
                    tracing::debug!(swept, "expired cache entries swept");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn store_with_limit(limit: usize) -> CacheStore<String, Vec<u8>> {
        CacheStore::new(limit)
    }

    #[test]
    fn test_round_trip() {
        let store = store_with_limit(1024);

        store.store_sized(
            "a".to_string(),
            vec![1, 2, 3],
            3,
            Duration::from_secs(60),
            Importance::Normal,
        );

        assert_eq!(store.retrieve(&"a".to_string()), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_miss_on_absent_key() {
        let store = store_with_limit(1024);

        assert!(store.retrieve(&"missing".to_string()).is_none());

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_ttl_expiry_on_retrieve() {
        let store = store_with_limit(1024);

        store.store_sized(
            "a".to_string(),
            vec![0u8; 4],
            4,
            Duration::from_millis(20),
            Importance::Normal,
        );

        assert!(store.retrieve(&"a".to_string()).is_some());

        thread::sleep(Duration::from_millis(40));

        // Expired entries read as misses and are removed on touch.
        assert!(store.retrieve(&"a".to_string()).is_none());
        assert_eq!(store.len(), 0);

        let stats = store.stats();
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_overwrite_replaces_payload_and_size() {
        let store = store_with_limit(1024);

        store.store_sized(
            "a".to_string(),
            vec![1u8; 100],
            100,
            Duration::from_secs(60),
            Importance::Normal,
        );
        store.store_sized(
            "a".to_string(),
            vec![2u8; 40],
            40,
            Duration::from_secs(60),
            Importance::Normal,
        );

        assert_eq!(store.len(), 1);
        assert_eq!(store.size_used(), 40);
        assert_eq!(store.retrieve(&"a".to_string()), Some(vec![2u8; 40]));
    }

    #[test]
    fn test_budget_invariant_after_many_inserts() {
        let store = store_with_limit(1000);

        for i in 0..100 {
            store.store_sized(
                format!("key-{i}"),
                vec![0u8; 100],
                100,
                Duration::from_secs(60),
                Importance::Normal,
            );
            assert!(
                store.size_used() <= 1000,
                "size exceeded budget after insert {i}: {}",
                store.size_used()
            );
        }

        let stats = store.stats();
        assert!(stats.evictions > 0, "expected evictions under budget pressure");
    }

    #[test]
    fn test_eviction_leaves_headroom() {
        let store = store_with_limit(1000);

        for i in 0..10 {
            store.store_sized(
                format!("key-{i}"),
                vec![0u8; 100],
                100,
                Duration::from_secs(60),
                Importance::Normal,
            );
        }
        assert_eq!(store.size_used(), 1000);

        // The insert that overflows the budget drives usage down to ~80%.
        store.store_sized(
            "overflow".to_string(),
            vec![0u8; 100],
            100,
            Duration::from_secs(60),
            Importance::Normal,
        );

        assert!(store.size_used() <= 800 + 100);
    }

    #[test]
    fn test_eviction_order_prefers_lower_score() {
        let store = store_with_limit(300);

        store.store_sized(
            "cold".to_string(),
            vec![0u8; 100],
            100,
            Duration::from_secs(60),
            Importance::Normal,
        );
        store.store_sized(
            "hot".to_string(),
            vec![0u8; 100],
            100,
            Duration::from_secs(60),
            Importance::Normal,
        );

        // Raise the hot entry's frequency well above the cold one's.
        for _ in 0..5 {
            assert!(store.retrieve(&"hot".to_string()).is_some());
        }

        // Overflow the budget; the cold entry must go first.
        store.store_sized(
            "new".to_string(),
            vec![0u8; 200],
            200,
            Duration::from_secs(60),
            Importance::Normal,
        );

        assert!(store.contains(&"hot".to_string()));
        assert!(!store.contains(&"cold".to_string()));
    }

    #[test]
    fn test_importance_protects_entries() {
        let store = store_with_limit(300);

        store.store_sized(
            "critical".to_string(),
            vec![0u8; 100],
            100,
            Duration::from_secs(60),
            Importance::Critical,
        );
        store.store_sized(
            "low".to_string(),
            vec![0u8; 100],
            100,
            Duration::from_secs(60),
            Importance::Low,
        );

        store.store_sized(
            "new".to_string(),
            vec![0u8; 200],
            200,
            Duration::from_secs(60),
            Importance::Normal,
        );

        assert!(store.contains(&"critical".to_string()));
        assert!(!store.contains(&"low".to_string()));
    }

    #[test]
    fn test_oversized_entry_refused() {
        let store = store_with_limit(100);

        store.store_sized(
            "huge".to_string(),
            vec![0u8; 500],
            500,
            Duration::from_secs(60),
            Importance::Critical,
        );

        assert!(!store.contains(&"huge".to_string()));
        assert_eq!(store.size_used(), 0);
    }

    #[test]
    fn test_sweep_expired_removes_cold_entries() {
        let store = store_with_limit(1024);

        store.store_sized(
            "short".to_string(),
            vec![0u8; 10],
            10,
            Duration::from_millis(10),
            Importance::Normal,
        );
        store.store_sized(
            "long".to_string(),
            vec![0u8; 10],
            10,
            Duration::from_secs(60),
            Importance::Normal,
        );

        thread::sleep(Duration::from_millis(30));

        // Never re-touched, but the sweep still reclaims it.
        let swept = store.sweep_expired();
        assert_eq!(swept, 1);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&"long".to_string()));
    }

    #[test]
    fn test_remove_and_clear() {
        let store = store_with_limit(1024);

        store.store_sized(
            "a".to_string(),
            vec![1],
            1,
            Duration::from_secs(60),
            Importance::Normal,
        );
        store.store_sized(
            "b".to_string(),
            vec![2],
            1,
            Duration::from_secs(60),
            Importance::Normal,
        );

        assert_eq!(store.remove(&"a".to_string()), Some(vec![1]));
        assert!(store.remove(&"a".to_string()).is_none());

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.size_used(), 0);
    }

    #[test]
    fn test_retain_accessed_within() {
        let store = store_with_limit(1024);

        store.store_sized(
            "old".to_string(),
            vec![0u8; 10],
            10,
            Duration::from_secs(60),
            Importance::Normal,
        );

        thread::sleep(Duration::from_millis(50));

        store.store_sized(
            "fresh".to_string(),
            vec![0u8; 10],
            10,
            Duration::from_secs(60),
            Importance::Normal,
        );

        let (removed, bytes) = store.retain_accessed_within(Duration::from_millis(25));
        assert_eq!(removed, 1);
        assert_eq!(bytes, 10);
        assert!(store.contains(&"fresh".to_string()));
        assert!(!store.contains(&"old".to_string()));
    }

    #[test]
    fn test_entry_info() {
        let store = store_with_limit(1024);

        store.store_sized(
            "a".to_string(),
            vec![0u8; 32],
            32,
            Duration::from_secs(60),
            Importance::High,
        );
        store.retrieve(&"a".to_string());
        store.retrieve(&"a".to_string());

        let info = store.entry_info(&"a".to_string()).unwrap();
        assert_eq!(info.access_count, 2);
        assert_eq!(info.size_estimate, 32);
        assert_eq!(info.importance, Importance::High);

        assert!(store.entry_info(&"missing".to_string()).is_none());
    }

    #[test]
    fn test_set_size_limit_shrink_evicts() {
        let store = store_with_limit(1000);

        for i in 0..10 {
            store.store_sized(
                format!("key-{i}"),
                vec![0u8; 100],
                100,
                Duration::from_secs(60),
                Importance::Normal,
            );
        }

        store.set_size_limit(500);
        assert!(store.size_used() <= 500);
        assert_eq!(store.size_limit(), 500);
    }

    #[test]
    fn test_contains_does_not_touch_bookkeeping() {
        let store = store_with_limit(1024);

        store.store_sized(
            "a".to_string(),
            vec![1],
            1,
            Duration::from_secs(60),
            Importance::Normal,
        );

        assert!(store.contains(&"a".to_string()));

        let stats = store.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(store.entry_info(&"a".to_string()).unwrap().access_count, 0);
    }

    #[test]
    fn test_stats_hit_rate() {
        let store = store_with_limit(1024);

        store.store_sized(
            "a".to_string(),
            vec![1],
            1,
            Duration::from_secs(60),
            Importance::Normal,
        );

        let _ = store.retrieve(&"a".to_string());
        let _ = store.retrieve(&"b".to_string());
        let _ = store.retrieve(&"c".to_string());

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_rate() - 1.0 / 3.0).abs() < 0.01);
    }

    #[test]
    fn test_frequency_decay_demotes_stale_hotness() {
        let store = store_with_limit(200);

        store.store_sized(
            "former-favorite".to_string(),
            vec![0u8; 100],
            100,
            Duration::from_secs(60),
            Importance::Normal,
        );
        for _ in 0..20 {
            store.retrieve(&"former-favorite".to_string());
        }

        // Several decay passes erase the historical burst.
        for _ in 0..8 {
            store.decay_frequencies();
        }

        store.store_sized(
            "newcomer".to_string(),
            vec![0u8; 100],
            100,
            Duration::from_secs(60),
            Importance::Normal,
        );
        store.retrieve(&"newcomer".to_string());
        store.retrieve(&"newcomer".to_string());

        store.store_sized(
            "overflow".to_string(),
            vec![0u8; 100],
            100,
            Duration::from_secs(60),
            Importance::Normal,
        );

        assert!(store.contains(&"newcomer".to_string()));
        assert!(!store.contains(&"former-favorite".to_string()));
    }

    #[test]
    fn test_randomized_workload_stays_bounded() {
        use rand::Rng;

        let store = store_with_limit(10_000);
        let mut rng = rand::thread_rng();

        for _ in 0..2_000 {
            let key = format!("key-{}", rng.gen_range(0..200));
            if rng.gen_bool(0.6) {
                let size = rng.gen_range(1..500);
                store.store_sized(
                    key,
                    vec![0u8; size],
                    size,
                    Duration::from_secs(60),
                    Importance::Normal,
                );
            } else {
                let _ = store.retrieve(&key);
            }
            assert!(store.size_used() <= 10_000);
        }
    }

    #[test]
    fn test_concurrent_access() {
        let store = store_with_limit(50_000);
        let mut handles = vec![];

        for thread_id in 0..4 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("t{thread_id}-{i}");
                    store.store_sized(
                        key.clone(),
                        vec![0u8; 50],
                        50,
                        Duration::from_secs(60),
                        Importance::Normal,
                    );
                    let _ = store.retrieve(&key);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(store.size_used() <= 50_000);
    }

    #[tokio::test]
    async fn test_sweeper_task_reclaims_expired_entries() {
        let store: CacheStore<String, Vec<u8>> = CacheStore::new(1024);

        store.store_sized(
            "a".to_string(),
            vec![0u8; 10],
            10,
            Duration::from_millis(10),
            Importance::Normal,
        );

        let sweeper = store.spawn_sweeper(Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(store.len(), 0);
        sweeper.abort();
    }
}
