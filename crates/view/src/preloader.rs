//! Predictive preloading from navigation history
//!
//! Watches where the user goes and warms the response cache for the most
//! likely next destination: a first-order prediction over the recent
//! transition history, plus opportunistic preloading of the most
//! frequently accessed entities. All preloads run at low priority and
//! never preempt user-initiated requests; a preload that is cancelled
//! before its response lands writes nothing to the cache.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use fieldside_cache::ResponseCache;
use fieldside_net::{RequestBatcher, RequestId, RequestPriority};

use crate::cancel::CancelFlag;

/// Tuning knobs for the preloader.
#[derive(Debug, Clone, Copy)]
pub struct PreloaderConfig {
    /// Number of recent navigation transitions retained.
    pub history_limit: usize,

    /// Number of top frequency-ranked entities retained.
    pub top_entities: usize,
}

impl Default for PreloaderConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            top_entities: 10,
        }
    }
}

/// Preloader statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreloaderStats {
    /// Predictions produced on navigation.
    pub predictions: u64,

    /// Preload requests issued.
    pub preloads_issued: u64,

    /// Preloads cancelled before a cache write.
    pub preloads_cancelled: u64,

    /// Preload responses stored into the cache.
    pub preloads_stored: u64,

    /// Preloads skipped because the cache already held the key.
    pub preloads_skipped: u64,
}

struct EntityRecord {
    count: u64,
    last_seen: u64,
}

struct PreloaderState {
    current: Option<String>,
    transitions: VecDeque<(String, String)>,
    entities: HashMap<String, EntityRecord>,
    seq: u64,
    stats: PreloaderStats,
}

struct PendingPreload {
    request_id: RequestId,
    flag: CancelFlag,
}

/// Predictive response preloader.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use fieldside_cache::ResponseCache;
/// # use fieldside_net::{FetchFuture, RequestBatcher};
/// use fieldside_view::{PredictivePreloader, PreloaderConfig};
///
/// # let fetcher = |_: &str, _: &[(String, String)]| -> FetchFuture {
/// #     Box::pin(async { Ok(Arc::from(b"".as_ref())) })
/// # };
/// # let batcher = RequestBatcher::new(Arc::new(fetcher));
/// # let responses = ResponseCache::new(1024);
/// let preloader =
///     PredictivePreloader::new(batcher, responses, PreloaderConfig::default());
///
/// // The user moves through screens; the preloader learns the pattern.
/// preloader.record_navigation("screen/roster");
/// preloader.record_navigation("screen/matchup");
/// preloader.record_navigation("screen/roster");
///
/// // After another visit to the roster, the matchup screen is the most
/// // likely successor and its data is preloaded in the background.
/// assert_eq!(
///     preloader.predict_next_destination(),
///     Some("screen/matchup".to_string())
/// );
/// ```
#[derive(Clone)]
pub struct PredictivePreloader {
    state: Arc<Mutex<PreloaderState>>,
    pending: Arc<Mutex<HashMap<String, PendingPreload>>>,
    batcher: RequestBatcher,
    responses: ResponseCache,
    config: PreloaderConfig,
}

impl PredictivePreloader {
    /// Create a preloader issuing requests through the given batcher and
    /// storing results in the given response cache.
    pub fn new(
        batcher: RequestBatcher,
        responses: ResponseCache,
        config: PreloaderConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(PreloaderState {
                current: None,
                transitions: VecDeque::new(),
                entities: HashMap::new(),
                seq: 0,
                stats: PreloaderStats::default(),
            })),
            pending: Arc::new(Mutex::new(HashMap::new())),
            batcher,
            responses,
            config,
        }
    }

    /// Record a navigation event and preload the predicted next
    /// destination at low priority.
    pub fn record_navigation(&self, destination: &str) {
        let prediction = {
            let mut state = self.state.lock().unwrap();

            if let Some(from) = state.current.take() {
                state.transitions.push_back((from, destination.to_string()));
                while state.transitions.len() > self.config.history_limit {
                    state.transitions.pop_front();
                }
            }
            state.current = Some(destination.to_string());

            let prediction = predict(&state.transitions, destination);
            if prediction.is_some() {
                state.stats.predictions += 1;
            }
            prediction
        };

        if let Some(next) = prediction {
            self.preload(&next);
        }
    }

    /// Record an access to an entity for frequency ranking.
    pub fn record_access(&self, entity: &str) {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        let seq = state.seq;

        let record = state
            .entities
            .entry(entity.to_string())
            .or_insert(EntityRecord {
                count: 0,
                last_seen: 0,
            });
        record.count += 1;
        record.last_seen = seq;

        // Keep only the top entries; ties resolved by most recent sighting.
        if state.entities.len() > self.config.top_entities {
            let mut ranked: Vec<(String, u64, u64)> = state
                .entities
                .iter()
                .map(|(key, record)| (key.clone(), record.count, record.last_seen))
                .collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));
            for (key, _, _) in ranked.into_iter().skip(self.config.top_entities) {
                state.entities.remove(&key);
            }
        }
    }

    /// The most likely next destination after the latest navigation.
    pub fn predict_next_destination(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        let current = state.current.as_deref()?;
        predict(&state.transitions, current)
    }

    /// The top frequency-ranked entities, most frequent first.
    pub fn top_entities(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut ranked: Vec<(&String, &EntityRecord)> = state.entities.iter().collect();
        ranked.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(b.1.last_seen.cmp(&a.1.last_seen)));
        ranked
            .into_iter()
            .take(self.config.top_entities)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Opportunistically preload the top frequency-ranked entities.
    ///
    /// Invoked when the screen that displays them becomes active.
    pub fn preload_top_entities(&self) {
        for entity in self.top_entities() {
            self.preload(&entity);
        }
    }

    /// Issue a low-priority preload for a destination's data.
    ///
    /// Skipped when the response cache already holds a live entry or a
    /// preload for the key is already in flight.
    pub fn preload(&self, key: &str) {
        if self.responses.contains(key) {
            let mut state = self.state.lock().unwrap();
            state.stats.preloads_skipped += 1;
            return;
        }

        let flag = CancelFlag::new();
        let (request_id, slot) =
            self.batcher
                .submit(key, Vec::new(), RequestPriority::Low);

        {
            let mut pending = self.pending.lock().unwrap();
            if pending.contains_key(key) {
                // A preload for this key is already running; withdraw ours.
                self.batcher.cancel(request_id);
                return;
            }
            pending.insert(
                key.to_string(),
                PendingPreload {
                    request_id,
                    flag: flag.clone(),
                },
            );
        }

        {
            let mut state = self.state.lock().unwrap();
            state.stats.preloads_issued += 1;
        }

        let preloader = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let result = slot.await;
            preloader.pending.lock().unwrap().remove(&key);

            // The cancellation check must precede the cache write; a
            // cancelled preload leaves no trace in the cache. The cancel
            // call itself already counted it.
            if flag.is_cancelled() {
                return;
            }

            match result {
                Ok(payload) => {
                    preloader.responses.insert(key, payload.to_vec());
                    let mut state = preloader.state.lock().unwrap();
                    state.stats.preloads_stored += 1;
                }
                Err(error) => {
                    // Preloads are speculative; failure costs nothing.
                    tracing::debug!(%key, %error, "preload failed");
                }
            }
        });
    }

    /// Cancel a single pending preload by key.
    pub fn cancel_key(&self, key: &str) -> bool {
        let pending = {
            let mut map = self.pending.lock().unwrap();
            map.remove(key)
        };
        match pending {
            Some(task) => {
                task.flag.cancel();
                self.batcher.cancel(task.request_id);
                let mut state = self.state.lock().unwrap();
                state.stats.preloads_cancelled += 1;
                true
            }
            None => false,
        }
    }

    /// Cancel every pending preload.
    ///
    /// Queued requests are withdrawn from the batcher; preloads whose
    /// fetch already started run to completion on the wire but skip the
    /// cache write. Returns the number cancelled.
    pub fn cancel_pending(&self) -> usize {
        let drained: Vec<PendingPreload> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().map(|(_, task)| task).collect()
        };

        let cancelled = drained.len();
        for task in &drained {
            task.flag.cancel();
            self.batcher.cancel(task.request_id);
        }

        if cancelled > 0 {
            let mut state = self.state.lock().unwrap();
            state.stats.preloads_cancelled += cancelled as u64;
            tracing::debug!(cancelled, "pending preloads cancelled");
        }
        cancelled
    }

    /// Number of preloads currently pending.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Preloader statistics.
    pub fn stats(&self) -> PreloaderStats {
        self.state.lock().unwrap().stats
    }
}

/// First-order successor prediction over the transition history.
///
/// Returns the most frequent successor of `from`; ties resolve to the
/// successor seen most recently.
fn predict(transitions: &VecDeque<(String, String)>, from: &str) -> Option<String> {
    let mut counts: HashMap<&str, (u64, usize)> = HashMap::new();
    for (position, (origin, successor)) in transitions.iter().enumerate() {
        if origin == from {
            let entry = counts.entry(successor.as_str()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 = position;
        }
    }

    counts
        .into_iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(a.1 .1.cmp(&b.1 .1)))
        .map(|(successor, _)| successor.to_string())
}
