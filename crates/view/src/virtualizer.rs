//! Viewport-aware list virtualization
//!
//! Tracks which indices of a large list are visible and reacts to
//! visibility transitions: newly visible items trigger asset preload
//! hints for a buffer window around them, items that scroll out of view
//! are scheduled for grace-period asset eviction, and every Nth
//! transition runs an opportunistic memory trim during natural scroll
//! pauses.
//!
//! Items outside the visible range plus buffer are never constructed;
//! the caller substitutes fixed-size placeholders so scroll geometry
//! stays stable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use fieldside_cache::AssetCache;

/// Contiguous inclusive range of visible list indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
}

impl VisibleRange {
    /// Create a range; `start` and `end` are inclusive.
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Whether the range covers an index.
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }

    /// The range widened symmetrically by `buffer` indices.
    pub fn expanded(&self, buffer: usize) -> Self {
        Self {
            start: self.start.saturating_sub(buffer),
            end: self.end.saturating_add(buffer),
        }
    }
}

/// Tuning knobs for the virtualizer.
#[derive(Debug, Clone, Copy)]
pub struct VirtualizerConfig {
    /// Symmetric buffer window preloaded around visible items.
    pub buffer: usize,

    /// Delay before an out-of-view item's asset eviction check runs,
    /// tolerating fast back-and-forth scrolling.
    pub evict_delay: Duration,

    /// Every Nth visible-transition runs the opportunistic trim hook.
    pub trim_interval: u64,

    /// Invisible records older than this are purged by cleanup.
    pub stale_record_age: Duration,

    /// Purge threshold while aggressive cleanup mode is active.
    pub aggressive_stale_record_age: Duration,
}

impl Default for VirtualizerConfig {
    fn default() -> Self {
        Self {
            buffer: 5,
            evict_delay: Duration::from_secs(2),
            trim_interval: 20,
            stale_record_age: Duration::from_secs(60),
            aggressive_stale_record_age: Duration::from_secs(15),
        }
    }
}

/// Virtualizer statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualizerStats {
    /// Registered item records.
    pub tracked: usize,

    /// Records currently visible.
    pub visible: usize,

    /// Lifetime hidden-to-visible transitions.
    pub visible_transitions: u64,

    /// Preload hints emitted.
    pub preload_hints: u64,

    /// Grace-period eviction checks performed.
    pub evict_checks: u64,

    /// Stale invisible records purged by cleanup.
    pub purged: u64,
}

/// Request to warm an asset for an item near the viewport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadHint {
    /// List index the asset belongs to.
    pub index: usize,

    /// Resource locator to fetch and cache.
    pub locator: String,
}

struct TrackedItem {
    id: String,
    asset: Option<String>,
    visible: bool,
    changed_at: Instant,
}

struct VirtState {
    items: HashMap<usize, TrackedItem>,
    range: Option<VisibleRange>,
    stats: VirtualizerStats,
}

/// Trim hook invoked every Nth visible-transition.
pub type TrimHook = Arc<dyn Fn() + Send + Sync>;

/// Viewport virtualizer for a large scrolling list.
///
/// # Example
///
/// ```
/// use fieldside_cache::AssetCache;
/// use fieldside_view::{ViewportVirtualizer, VirtualizerConfig, VisibleRange};
///
/// # async fn run() {
/// let assets = AssetCache::new(8 * 1024 * 1024);
/// let (virtualizer, mut hints) =
///     ViewportVirtualizer::new(assets, VirtualizerConfig::default());
///
/// for index in 0..100 {
///     virtualizer.register_view(
///         index,
///         format!("player-{index}"),
///         Some(format!("cdn/headshots/{index}.png")),
///     );
/// }
///
/// virtualizer.set_visible_range(Some(VisibleRange::new(0, 10)));
/// // Preload hints for the visible window plus buffer arrive on `hints`.
/// let first = hints.recv().await.unwrap();
/// assert!(first.index <= 15);
/// # }
/// ```
#[derive(Clone)]
pub struct ViewportVirtualizer {
    state: Arc<Mutex<VirtState>>,
    assets: AssetCache,
    config: VirtualizerConfig,
    hints: mpsc::UnboundedSender<PreloadHint>,
    trim_hook: Arc<Mutex<Option<TrimHook>>>,
}

impl ViewportVirtualizer {
    /// Create a virtualizer and the receiving end of its preload hints.
    pub fn new(
        assets: AssetCache,
        config: VirtualizerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<PreloadHint>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(Mutex::new(VirtState {
                    items: HashMap::new(),
                    range: None,
                    stats: VirtualizerStats::default(),
                })),
                assets,
                config,
                hints: tx,
                trim_hook: Arc::new(Mutex::new(None)),
            },
            rx,
        )
    }

    /// Install the opportunistic trim hook.
    pub fn set_trim_hook(&self, hook: TrimHook) {
        *self.trim_hook.lock().unwrap() = Some(hook);
    }

    /// Register an item record for tracking.
    ///
    /// Items start invisible; `asset` is the locator preloaded/evicted as
    /// the item moves around the viewport.
    pub fn register_view(&self, index: usize, id: String, asset: Option<String>) {
        let mut state = self.state.lock().unwrap();
        state.items.insert(
            index,
            TrackedItem {
                id,
                asset,
                visible: false,
                changed_at: Instant::now(),
            },
        );
        state.stats.tracked = state.items.len();
    }

    /// Drop an item record.
    pub fn unregister_view(&self, index: usize) {
        let mut state = self.state.lock().unwrap();
        state.items.remove(&index);
        state.stats.tracked = state.items.len();
    }

    /// Recompute visibility from a new visible range (or `None` when the
    /// list left the screen entirely).
    ///
    /// Every item transitioning to visible emits buffer-window preload
    /// hints; every item transitioning to invisible is scheduled for a
    /// delayed asset-eviction check.
    pub fn set_visible_range(&self, range: Option<VisibleRange>) {
        let mut newly_visible = Vec::new();
        let mut newly_hidden = Vec::new();
        let mut transitions_to_run = 0u64;

        {
            let mut state = self.state.lock().unwrap();
            state.range = range;

            let indices: Vec<usize> = state.items.keys().copied().collect();
            for index in indices {
                let should_be_visible =
                    range.map(|r| r.contains(index)).unwrap_or(false);
                let item = state.items.get_mut(&index).unwrap();
                if item.visible == should_be_visible {
                    continue;
                }
                item.visible = should_be_visible;
                item.changed_at = Instant::now();

                if should_be_visible {
                    state.stats.visible_transitions += 1;
                    if state.stats.visible_transitions % self.config.trim_interval == 0 {
                        transitions_to_run += 1;
                    }
                    newly_visible.push(index);
                } else {
                    newly_hidden.push(index);
                }
            }
            state.stats.visible = state.items.values().filter(|i| i.visible).count();
        }

        for index in newly_visible {
            self.emit_buffer_hints(index);
        }
        for index in newly_hidden {
            self.schedule_evict_check(index);
        }
        for _ in 0..transitions_to_run {
            self.run_trim_hook();
        }
    }

    /// Mark a single item visible, leaving the rest of the range alone.
    pub fn mark_visible(&self, index: usize) {
        let transition = {
            let mut state = self.state.lock().unwrap();
            match state.items.get_mut(&index) {
                Some(item) if !item.visible => {
                    item.visible = true;
                    item.changed_at = Instant::now();
                    state.stats.visible_transitions += 1;
                    state.stats.visible =
                        state.items.values().filter(|i| i.visible).count();
                    let run_trim =
                        state.stats.visible_transitions % self.config.trim_interval == 0;
                    Some(run_trim)
                }
                _ => None,
            }
        };

        if let Some(run_trim) = transition {
            self.emit_buffer_hints(index);
            if run_trim {
                self.run_trim_hook();
            }
        }
    }

    /// Mark a single item hidden, scheduling its eviction check.
    pub fn mark_hidden(&self, index: usize) {
        let transitioned = {
            let mut state = self.state.lock().unwrap();
            match state.items.get_mut(&index) {
                Some(item) if item.visible => {
                    item.visible = false;
                    item.changed_at = Instant::now();
                    state.stats.visible =
                        state.items.values().filter(|i| i.visible).count();
                    true
                }
                _ => false,
            }
        };

        if transitioned {
            self.schedule_evict_check(index);
        }
    }

    /// The current visible range.
    pub fn visible_range(&self) -> Option<VisibleRange> {
        self.state.lock().unwrap().range
    }

    /// Whether an item should be constructed at all.
    ///
    /// Callers substitute a fixed-size placeholder for everything outside
    /// the visible range plus buffer.
    pub fn should_construct(&self, index: usize) -> bool {
        let state = self.state.lock().unwrap();
        state
            .range
            .map(|r| r.expanded(self.config.buffer).contains(index))
            .unwrap_or(false)
    }

    /// An item's registered id, if tracked.
    pub fn item_id(&self, index: usize) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.items.get(&index).map(|item| item.id.clone())
    }

    /// Purge invisible records older than the configured threshold.
    ///
    /// Used by the memory-pressure cascade; `aggressive` selects the
    /// shorter threshold. Returns the number purged.
    pub fn purge_stale_invisible(&self, aggressive: bool) -> usize {
        let threshold = if aggressive {
            self.config.aggressive_stale_record_age
        } else {
            self.config.stale_record_age
        };

        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let before = state.items.len();
        state.items.retain(|_, item| {
            item.visible || now.duration_since(item.changed_at) <= threshold
        });
        let purged = before - state.items.len();
        state.stats.tracked = state.items.len();
        state.stats.purged += purged as u64;

        if purged > 0 {
            tracing::debug!(purged, aggressive, "stale item records purged");
        }
        purged
    }

    /// Virtualizer statistics.
    pub fn stats(&self) -> VirtualizerStats {
        self.state.lock().unwrap().stats
    }

    /// Emit preload hints for the buffer window around a newly visible
    /// index, skipping assets that are already cached.
    fn emit_buffer_hints(&self, index: usize) {
        let window = VisibleRange::new(index, index).expanded(self.config.buffer);

        let mut hints = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            for i in window.start..=window.end {
                let Some(item) = state.items.get(&i) else {
                    continue;
                };
                let Some(locator) = item.asset.clone() else {
                    continue;
                };
                if self.assets.contains(&locator) {
                    continue;
                }
                hints.push(PreloadHint { index: i, locator });
            }
            state.stats.preload_hints += hints.len() as u64;
        }

        for hint in hints {
            // Receiver gone means the wiring is shutting down; drop hints.
            let _ = self.hints.send(hint);
        }
    }

    /// Schedule the delayed grace-period eviction check for an item that
    /// scrolled out of view.
    fn schedule_evict_check(&self, index: usize) {
        let locator = {
            let state = self.state.lock().unwrap();
            match state.items.get(&index).and_then(|item| item.asset.clone()) {
                Some(locator) => locator,
                None => return,
            }
        };

        let virtualizer = self.clone();
        let delay = self.config.evict_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let still_hidden = {
                let state = virtualizer.state.lock().unwrap();
                state
                    .items
                    .get(&index)
                    .map(|item| !item.visible)
                    // Unregistered in the interim: still evictable.
                    .unwrap_or(true)
            };

            if still_hidden {
                virtualizer.assets.evict_if_not_recently_used(&locator);
                let mut state = virtualizer.state.lock().unwrap();
                state.stats.evict_checks += 1;
            }
        });
    }

    fn run_trim_hook(&self) {
        let hook = self.trim_hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}
