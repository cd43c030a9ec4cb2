//! Byte-budgeted asset cache for decoded media blobs
//!
//! Caches opaque decoded assets (player headshots, team crests, sparkline
//! bitmaps) keyed by resource locator. Entries are budgeted by estimated
//! byte size; decoding itself is a collaborator's responsibility, this
//! cache only holds the result.

use std::sync::Arc;
use std::time::Duration;

use crate::store::{CacheStore, Importance, StoreStats};

/// Bytes per pixel for decoded RGBA bitmaps.
const BYTES_PER_PIXEL: usize = 4;

/// Default TTL for cached assets.
const DEFAULT_ASSET_TTL: Duration = Duration::from_secs(10 * 60);

/// Idle window after which an out-of-view asset becomes evictable.
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Entries with at least this many hits survive the out-of-view eviction.
const RETAINED_HIT_COUNT: u64 = 3;

/// Only entries accessed within this window survive a memory warning.
const DEFAULT_WARNING_RETENTION: Duration = Duration::from_secs(10);

/// An opaque decoded asset with an associated size estimate.
///
/// The payload is shared, so clones handed out by the cache are cheap and
/// do not duplicate pixel data.
#[derive(Debug, Clone)]
pub struct AssetBlob {
    bytes: Arc<[u8]>,
    size_estimate: usize,
}

impl AssetBlob {
    /// Wrap raw bytes; the size estimate is the byte length.
    pub fn new(bytes: Vec<u8>) -> Self {
        let size_estimate = bytes.len();
        Self {
            bytes: bytes.into(),
            size_estimate,
        }
    }

    /// Wrap a decoded bitmap, estimating its resident size as
    /// `width x height x 4` regardless of the encoded byte length.
    pub fn from_bitmap(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        let size_estimate = width as usize * height as usize * BYTES_PER_PIXEL;
        Self {
            bytes: bytes.into(),
            size_estimate,
        }
    }

    /// The asset's raw bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Estimated resident size in bytes.
    pub fn size_estimate(&self) -> usize {
        self.size_estimate
    }
}

/// Byte-budgeted cache of decoded assets keyed by resource locator.
///
/// A thin specialization of [`CacheStore`] with two additional policies
/// used by the list virtualizer and the memory-pressure cascade:
///
/// - [`AssetCache::evict_if_not_recently_used`] drops an asset whose item
///   scrolled out of view, unless it was accessed recently or has proven
///   itself with repeated hits.
/// - [`AssetCache::on_memory_warning`] keeps only very recently accessed
///   assets, bypassing eviction scoring entirely.
///
/// # Example
///
/// ```
/// use fieldside_cache::{AssetBlob, AssetCache};
///
/// let cache = AssetCache::new(8 * 1024 * 1024);
///
/// let headshot = AssetBlob::from_bitmap(vec![0u8; 96 * 96 * 4], 96, 96);
/// cache.insert("cdn/players/412.png".to_string(), headshot);
///
/// assert!(cache.get("cdn/players/412.png").is_some());
/// ```
#[derive(Clone)]
pub struct AssetCache {
    store: CacheStore<String, AssetBlob>,
    default_ttl: Duration,
    grace_period: Duration,
    warning_retention: Duration,
}

impl AssetCache {
    /// Create an asset cache with the given byte budget.
    pub fn new(byte_limit: usize) -> Self {
        Self {
            store: CacheStore::new(byte_limit),
            default_ttl: DEFAULT_ASSET_TTL,
            grace_period: DEFAULT_GRACE_PERIOD,
            warning_retention: DEFAULT_WARNING_RETENTION,
        }
    }

    /// Set the default TTL applied by [`AssetCache::insert`].
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the idle grace period for out-of-view eviction.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set the retention window applied on memory warnings.
    pub fn with_warning_retention(mut self, window: Duration) -> Self {
        self.warning_retention = window;
        self
    }

    /// Insert an asset with the default TTL at normal importance.
    pub fn insert(&self, locator: String, blob: AssetBlob) {
        self.insert_with(locator, blob, self.default_ttl, Importance::Normal);
    }

    /// Insert an asset with an explicit TTL and importance tier.
    pub fn insert_with(
        &self,
        locator: String,
        blob: AssetBlob,
        ttl: Duration,
        importance: Importance,
    ) {
        let size = blob.size_estimate();
        self.store.store_sized(locator, blob, size, ttl, importance);
    }

    /// Retrieve an asset, updating its access bookkeeping.
    pub fn get(&self, locator: &str) -> Option<AssetBlob> {
        self.store.retrieve(&locator.to_string())
    }

    /// Check for a live entry without touching access bookkeeping.
    pub fn contains(&self, locator: &str) -> bool {
        self.store.contains(&locator.to_string())
    }

    /// Remove a specific asset.
    pub fn remove(&self, locator: &str) -> Option<AssetBlob> {
        self.store.remove(&locator.to_string())
    }

    /// Evict an asset that has scrolled out of view, if it is cold.
    ///
    /// The asset is removed when it has been idle longer than the grace
    /// period *and* has fewer than three lifetime hits. Frequently used
    /// assets survive scroll-out so fast back-and-forth scrolling does
    /// not thrash the cache. Returns `true` if the asset was removed.
    pub fn evict_if_not_recently_used(&self, locator: &str) -> bool {
        let key = locator.to_string();
        match self.store.entry_info(&key) {
            Some(info)
                if info.idle > self.grace_period
                    && info.access_count < RETAINED_HIT_COUNT =>
            {
                self.store.remove(&key).is_some()
            }
            _ => false,
        }
    }

    /// Respond to a memory warning by dropping everything not accessed
    /// within the retention window, regardless of eviction scoring.
    ///
    /// Returns the number of bytes freed.
    pub fn on_memory_warning(&self) -> usize {
        let (removed, bytes) = self.store.retain_accessed_within(self.warning_retention);
        if removed > 0 {
            tracing::debug!(removed, bytes, "asset cache purged on memory warning");
        }
        bytes
    }

    /// Remove every asset.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Remove expired assets. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        self.store.sweep_expired()
    }

    /// Spawn the periodic sweeper task for this cache.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        self.store.spawn_sweeper(interval)
    }

    /// Number of cached assets.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Check whether the cache holds no assets.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Total estimated bytes held.
    pub fn size_used(&self) -> usize {
        self.store.size_used()
    }

    /// Usage statistics.
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_bitmap_size_estimate() {
        let blob = AssetBlob::from_bitmap(vec![0u8; 128], 96, 96);
        assert_eq!(blob.size_estimate(), 96 * 96 * 4);

        let raw = AssetBlob::new(vec![0u8; 128]);
        assert_eq!(raw.size_estimate(), 128);
    }

    #[test]
    fn test_insert_and_get() {
        let cache = AssetCache::new(1024 * 1024);

        let blob = AssetBlob::new(vec![1, 2, 3, 4]);
        cache.insert("cdn/a.png".to_string(), blob);

        let fetched = cache.get("cdn/a.png").unwrap();
        assert_eq!(fetched.bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_budget_bounded_by_bitmap_estimate() {
        // Room for roughly two 96x96 RGBA bitmaps.
        let cache = AssetCache::new(2 * 96 * 96 * 4 + 100);

        for i in 0..10 {
            let blob = AssetBlob::from_bitmap(vec![0u8; 16], 96, 96);
            cache.insert(format!("cdn/{i}.png"), blob);
            assert!(cache.size_used() <= 2 * 96 * 96 * 4 + 100);
        }
    }

    #[test]
    fn test_evict_if_not_recently_used_requires_idle_and_cold() {
        let cache = AssetCache::new(1024 * 1024)
            .with_grace_period(Duration::from_millis(20));

        cache.insert("cdn/a.png".to_string(), AssetBlob::new(vec![0u8; 16]));

        // Still within the grace period: not evicted.
        assert!(!cache.evict_if_not_recently_used("cdn/a.png"));
        assert!(cache.contains("cdn/a.png"));

        thread::sleep(Duration::from_millis(40));

        // Idle past the grace period with < 3 hits: evicted.
        assert!(cache.evict_if_not_recently_used("cdn/a.png"));
        assert!(!cache.contains("cdn/a.png"));
    }

    #[test]
    fn test_evict_if_not_recently_used_spares_frequent_assets() {
        let cache = AssetCache::new(1024 * 1024)
            .with_grace_period(Duration::from_millis(20));

        cache.insert("cdn/a.png".to_string(), AssetBlob::new(vec![0u8; 16]));
        for _ in 0..3 {
            cache.get("cdn/a.png");
        }

        thread::sleep(Duration::from_millis(40));

        // Idle, but with three lifetime hits it is retained.
        assert!(!cache.evict_if_not_recently_used("cdn/a.png"));
        assert!(cache.contains("cdn/a.png"));
    }

    #[test]
    fn test_evict_if_not_recently_used_missing_key() {
        let cache = AssetCache::new(1024);
        assert!(!cache.evict_if_not_recently_used("cdn/none.png"));
    }

    #[test]
    fn test_memory_warning_keeps_only_recent() {
        let cache = AssetCache::new(1024 * 1024)
            .with_warning_retention(Duration::from_millis(25));

        cache.insert("cdn/old.png".to_string(), AssetBlob::new(vec![0u8; 64]));

        thread::sleep(Duration::from_millis(50));

        cache.insert("cdn/new.png".to_string(), AssetBlob::new(vec![0u8; 32]));

        let freed = cache.on_memory_warning();
        assert_eq!(freed, 64);
        assert!(!cache.contains("cdn/old.png"));
        assert!(cache.contains("cdn/new.png"));
    }

    #[test]
    fn test_memory_warning_ignores_access_count() {
        let cache = AssetCache::new(1024 * 1024)
            .with_warning_retention(Duration::from_millis(25));

        cache.insert("cdn/popular.png".to_string(), AssetBlob::new(vec![0u8; 64]));
        for _ in 0..10 {
            cache.get("cdn/popular.png");
        }

        thread::sleep(Duration::from_millis(50));

        // Heavily accessed in the past, but not within the window:
        // dropped unconditionally.
        cache.on_memory_warning();
        assert!(!cache.contains("cdn/popular.png"));
    }

    #[test]
    fn test_shared_bytes_are_cheap_clones() {
        let cache = AssetCache::new(1024 * 1024);

        let blob = AssetBlob::new(vec![7u8; 1000]);
        cache.insert("cdn/a.png".to_string(), blob);

        let first = cache.get("cdn/a.png").unwrap();
        let second = cache.get("cdn/a.png").unwrap();
        assert!(Arc::ptr_eq(&first.bytes, &second.bytes));
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = AssetCache::new(1024).with_default_ttl(Duration::from_millis(15));

        cache.insert("cdn/a.png".to_string(), AssetBlob::new(vec![0u8; 8]));
        assert!(cache.get("cdn/a.png").is_some());

        thread::sleep(Duration::from_millis(30));
        assert!(cache.get("cdn/a.png").is_none());
    }
}
