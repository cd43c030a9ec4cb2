//! Stale-while-revalidate response cache
//!
//! Caches API response payloads keyed by endpoint. A cached value is
//! served as long as it has not fully expired; once it passes the stale
//! threshold, callers are signalled to refresh it in the background while
//! the requester still gets the cached value immediately. Caller-visible
//! latency is bounded by cache lookup time unless the entry is fully
//! expired.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::store::{CacheStore, Importance, StoreStats};

/// Shared response payload handed out by the cache.
pub type ResponseBody = Arc<[u8]>;

/// TTL/staleness profile applied to new inserts.
///
/// The strategy is supplied by the network-condition layer and swapped as
/// a whole value; entries already stored keep the strategy they were
/// inserted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStrategy {
    /// Lifetime after which an entry reads as a miss.
    pub default_ttl: Duration,

    /// Age after which an entry should be refreshed in the background.
    pub stale_window: Duration,
}

impl CacheStrategy {
    /// Create a strategy with an explicit TTL and stale window.
    pub fn new(default_ttl: Duration, stale_window: Duration) -> Self {
        Self {
            default_ttl,
            stale_window,
        }
    }

    /// Create a strategy that marks entries stale at half their TTL.
    pub fn with_ttl(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            stale_window: default_ttl / 2,
        }
    }
}

impl Default for CacheStrategy {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(300))
    }
}

/// Response cache statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseCacheStats {
    /// Underlying store statistics.
    pub store: StoreStats,

    /// Number of times a caller was told to revalidate a stale entry.
    pub revalidations_signalled: u64,

    /// Number of completed background refreshes reported back.
    pub revalidations_completed: u64,

    /// Number of stale entries force-invalidated under memory pressure.
    pub stale_invalidations: u64,
}

#[derive(Debug, Clone)]
struct StoredResponse {
    body: ResponseBody,
    stale_after: Duration,
}

struct RevalidationState {
    in_flight: HashSet<String>,
    signalled: u64,
    completed: u64,
    stale_invalidations: u64,
}

/// Stale-while-revalidate cache of response payloads.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use fieldside_cache::{CacheStrategy, ResponseCache};
///
/// let cache = ResponseCache::new(4 * 1024 * 1024);
/// cache.set_strategy(CacheStrategy::with_ttl(Duration::from_secs(60)));
///
/// cache.insert("api/standings".to_string(), b"[]".to_vec());
///
/// // Fresh: serve it, no refresh needed.
/// assert!(cache.get_cached("api/standings").is_some());
/// assert!(!cache.should_revalidate("api/standings"));
/// ```
#[derive(Clone)]
pub struct ResponseCache {
    store: CacheStore<String, StoredResponse>,
    strategy: Arc<Mutex<CacheStrategy>>,
    revalidation: Arc<Mutex<RevalidationState>>,
}

impl ResponseCache {
    /// Create a response cache with the given byte budget.
    pub fn new(byte_limit: usize) -> Self {
        Self {
            store: CacheStore::new(byte_limit),
            strategy: Arc::new(Mutex::new(CacheStrategy::default())),
            revalidation: Arc::new(Mutex::new(RevalidationState {
                in_flight: HashSet::new(),
                signalled: 0,
                completed: 0,
                stale_invalidations: 0,
            })),
        }
    }

    /// Replace the active strategy.
    ///
    /// Applies to future inserts only; entries already stored keep the
    /// TTL and stale window they were inserted under.
    pub fn set_strategy(&self, strategy: CacheStrategy) {
        *self.strategy.lock().unwrap() = strategy;
    }

    /// The currently active strategy.
    pub fn strategy(&self) -> CacheStrategy {
        *self.strategy.lock().unwrap()
    }

    /// Cache a response payload under the active strategy.
    ///
    /// Also clears any pending revalidation flag for the key: a fresh
    /// insert is what a completed refresh produces.
    pub fn insert(&self, key: String, body: Vec<u8>) {
        let strategy = self.strategy();
        self.insert_with(key, body, strategy.default_ttl, strategy.stale_window);
    }

    /// Cache a response payload with an explicit TTL and stale window.
    pub fn insert_with(
        &self,
        key: String,
        body: Vec<u8>,
        ttl: Duration,
        stale_window: Duration,
    ) {
        let size = body.len();
        let stored = StoredResponse {
            body: body.into(),
            stale_after: stale_window,
        };
        self.store
            .store_sized(key.clone(), stored, size, ttl, Importance::Normal);

        let mut reval = self.revalidation.lock().unwrap();
        if reval.in_flight.remove(&key) {
            reval.completed += 1;
        }
    }

    /// Retrieve a cached response.
    ///
    /// Returns the payload unless the entry has fully expired; a stale
    /// but unexpired entry is still served. Pair with
    /// [`ResponseCache::should_revalidate`] to refresh in the background.
    pub fn get_cached(&self, key: &str) -> Option<ResponseBody> {
        self.store
            .retrieve(&key.to_string())
            .map(|stored| stored.body)
    }

    /// Check for a live (unexpired) entry without touching access
    /// bookkeeping.
    pub fn contains(&self, key: &str) -> bool {
        self.store.contains(&key.to_string())
    }

    /// Whether the caller should kick off a background refresh.
    ///
    /// True when the entry is past its stale window but not expired, and
    /// no refresh for it has been signalled yet. Signalling is
    /// single-flight: repeated calls return `false` until the refresh
    /// lands (via [`ResponseCache::insert`]) or is abandoned with
    /// [`ResponseCache::abandon_revalidation`].
    pub fn should_revalidate(&self, key: &str) -> bool {
        let key_owned = key.to_string();
        let Some(info) = self.store.entry_info(&key_owned) else {
            return false;
        };
        let Some(stored) = self.store.peek(&key_owned) else {
            return false;
        };

        if info.age <= stored.stale_after {
            return false;
        }

        let mut reval = self.revalidation.lock().unwrap();
        if reval.in_flight.insert(key_owned) {
            reval.signalled += 1;
            true
        } else {
            false
        }
    }

    /// Drop the single-flight refresh flag for a key whose refresh
    /// failed or was cancelled, so a later read can signal again.
    pub fn abandon_revalidation(&self, key: &str) {
        let mut reval = self.revalidation.lock().unwrap();
        reval.in_flight.remove(key);
    }

    /// Force-invalidate every entry past its stale window.
    ///
    /// Used by the memory-pressure cascade: the next read of an affected
    /// key misses and refetches. Returns the number of entries dropped.
    pub fn invalidate_stale(&self) -> usize {
        let (removed, bytes) = self
            .store
            .remove_where(|_key, info, stored| info.age > stored.stale_after);

        if removed > 0 {
            tracing::debug!(removed, bytes, "stale responses invalidated");
        }

        let mut reval = self.revalidation.lock().unwrap();
        reval.stale_invalidations += removed as u64;
        removed
    }

    /// Remove a specific entry.
    pub fn remove(&self, key: &str) {
        self.store.remove(&key.to_string());
        self.abandon_revalidation(key);
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.store.clear();
        let mut reval = self.revalidation.lock().unwrap();
        reval.in_flight.clear();
    }

    /// Remove expired entries. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        self.store.sweep_expired()
    }

    /// Spawn the periodic sweeper task for this cache.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        self.store.spawn_sweeper(interval)
    }

    /// Number of cached responses.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Check whether the cache holds no responses.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Total estimated bytes held.
    pub fn size_used(&self) -> usize {
        self.store.size_used()
    }

    /// Usage statistics.
    pub fn stats(&self) -> ResponseCacheStats {
        let reval = self.revalidation.lock().unwrap();
        ResponseCacheStats {
            store: self.store.stats(),
            revalidations_signalled: reval.signalled,
            revalidations_completed: reval.completed,
            stale_invalidations: reval.stale_invalidations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn cache_with_strategy(ttl_ms: u64, stale_ms: u64) -> ResponseCache {
        let cache = ResponseCache::new(1024 * 1024);
        cache.set_strategy(CacheStrategy::new(
            Duration::from_millis(ttl_ms),
            Duration::from_millis(stale_ms),
        ));
        cache
    }

    #[test]
    fn test_fresh_entry_served_without_revalidation() {
        let cache = cache_with_strategy(200, 100);

        cache.insert("api/roster".to_string(), b"data".to_vec());

        assert_eq!(
            cache.get_cached("api/roster").as_deref(),
            Some(b"data".as_ref())
        );
        assert!(!cache.should_revalidate("api/roster"));
    }

    #[test]
    fn test_stale_entry_served_and_flagged() {
        let cache = cache_with_strategy(200, 40);

        cache.insert("api/roster".to_string(), b"data".to_vec());

        thread::sleep(Duration::from_millis(80));

        // Past the stale window but within TTL: served, and flagged for a
        // background refresh exactly once.
        assert!(cache.get_cached("api/roster").is_some());
        assert!(cache.should_revalidate("api/roster"));
        assert!(!cache.should_revalidate("api/roster"));
    }

    #[test]
    fn test_expired_entry_reads_as_miss() {
        let cache = cache_with_strategy(30, 15);

        cache.insert("api/roster".to_string(), b"data".to_vec());

        thread::sleep(Duration::from_millis(60));

        assert!(cache.get_cached("api/roster").is_none());
        assert!(!cache.should_revalidate("api/roster"));
    }

    #[test]
    fn test_insert_completes_revalidation() {
        let cache = cache_with_strategy(500, 30);

        cache.insert("api/roster".to_string(), b"v1".to_vec());
        thread::sleep(Duration::from_millis(60));

        assert!(cache.should_revalidate("api/roster"));

        // The background refresh lands as a fresh insert.
        cache.insert("api/roster".to_string(), b"v2".to_vec());

        assert_eq!(
            cache.get_cached("api/roster").as_deref(),
            Some(b"v2".as_ref())
        );
        assert!(!cache.should_revalidate("api/roster"));

        let stats = cache.stats();
        assert_eq!(stats.revalidations_signalled, 1);
        assert_eq!(stats.revalidations_completed, 1);
    }

    #[test]
    fn test_abandoned_revalidation_can_signal_again() {
        let cache = cache_with_strategy(500, 30);

        cache.insert("api/roster".to_string(), b"v1".to_vec());
        thread::sleep(Duration::from_millis(60));

        assert!(cache.should_revalidate("api/roster"));
        cache.abandon_revalidation("api/roster");
        assert!(cache.should_revalidate("api/roster"));
    }

    #[test]
    fn test_strategy_swap_is_forward_looking() {
        let cache = cache_with_strategy(60, 30);

        cache.insert("api/old".to_string(), b"old".to_vec());

        // Swap to a much longer-lived strategy; the old entry keeps its
        // original TTL.
        cache.set_strategy(CacheStrategy::with_ttl(Duration::from_secs(300)));
        cache.insert("api/new".to_string(), b"new".to_vec());

        thread::sleep(Duration::from_millis(90));

        assert!(cache.get_cached("api/old").is_none());
        assert!(cache.get_cached("api/new").is_some());
    }

    #[test]
    fn test_invalidate_stale_forces_miss() {
        let cache = cache_with_strategy(1_000, 20);

        cache.insert("api/stale".to_string(), b"a".to_vec());
        cache.set_strategy(CacheStrategy::new(
            Duration::from_millis(1_000),
            Duration::from_millis(500),
        ));
        cache.insert("api/fresh".to_string(), b"b".to_vec());

        thread::sleep(Duration::from_millis(50));

        let dropped = cache.invalidate_stale();
        assert_eq!(dropped, 1);
        assert!(cache.get_cached("api/stale").is_none());
        assert!(cache.get_cached("api/fresh").is_some());
    }

    #[test]
    fn test_default_stale_window_is_half_ttl() {
        let strategy = CacheStrategy::with_ttl(Duration::from_secs(100));
        assert_eq!(strategy.stale_window, Duration::from_secs(50));
    }

    #[test]
    fn test_remove_clears_revalidation_flag() {
        let cache = cache_with_strategy(500, 20);

        cache.insert("api/roster".to_string(), b"v1".to_vec());
        thread::sleep(Duration::from_millis(40));
        assert!(cache.should_revalidate("api/roster"));

        cache.remove("api/roster");
        cache.insert("api/roster".to_string(), b"v2".to_vec());
        thread::sleep(Duration::from_millis(40));

        // A fresh staleness episode signals again.
        assert!(cache.should_revalidate("api/roster"));
    }
}
