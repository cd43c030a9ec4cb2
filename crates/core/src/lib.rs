//! Fieldside Core Library
//!
//! Wires the adaptive performance layer together: caches, request
//! batcher, connectivity monitor, viewport virtualizer, predictive
//! preloader, and memory-pressure controller are constructed explicitly
//! here and handed to each other by reference. Nothing reaches for
//! global state; a process normally builds exactly one [`PerfLayer`] at
//! startup and passes handles down.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fieldside_core::{PerfConfig, PerfLayer};
//! use fieldside_net::{FetchFuture, RequestPriority};
//!
//! # async fn run() {
//! let fetcher = |endpoint: &str, _params: &[(String, String)]| -> FetchFuture {
//!     let endpoint = endpoint.to_string();
//!     Box::pin(async move {
//!         // Real transport lives in the networking layer.
//!         Ok(Arc::from(format!("payload for {endpoint}").as_bytes()))
//!     })
//! };
//!
//! let layer = PerfLayer::builder()
//!     .config(PerfConfig::default())
//!     .build(Arc::new(fetcher));
//!
//! let standings = layer
//!     .fetch_cached("api/standings", Vec::new(), RequestPriority::High)
//!     .await
//!     .unwrap();
//! println!("{} bytes", standings.len());
//! # }
//! ```

mod config;
mod snapshot;

pub use config::{ConfigError, PerfConfig};
pub use snapshot::DiagnosticsSnapshot;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use fieldside_cache::{AssetBlob, AssetCache, ResponseCache};
use fieldside_net::{
    Connectivity, FetchError, Fetcher, NetworkConditionMonitor, Payload, RequestBatcher,
    RequestParams, RequestPriority,
};
use fieldside_pressure::{
    CleanupStep, FootprintProbe, MemoryPressureController, MemoryProbe,
};
use fieldside_view::{PredictivePreloader, PreloadHint, ViewportVirtualizer};

/// Trim callback for a bulk in-memory model cache.
///
/// Receives whether aggressive cleanup is active and returns an estimate
/// of what it released. Registered trimmers run as the final step of the
/// pressure cascade.
pub type ModelTrimmer = Arc<dyn Fn(bool) -> usize + Send + Sync>;

/// Builder for [`PerfLayer`].
pub struct PerfLayerBuilder {
    config: PerfConfig,
    probe: Option<Arc<dyn MemoryProbe>>,
    model_trimmers: Vec<ModelTrimmer>,
}

impl PerfLayerBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: PerfConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the memory probe.
    ///
    /// Defaults to a [`FootprintProbe`] over the layer's own caches.
    pub fn probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Register a bulk model-cache trimmer for the cleanup cascade.
    pub fn model_trimmer(mut self, trimmer: ModelTrimmer) -> Self {
        self.model_trimmers.push(trimmer);
        self
    }

    /// Construct the layer over the given transport and start its
    /// background tasks.
    pub fn build(self, fetcher: Arc<dyn Fetcher>) -> PerfLayer {
        let config = self.config;

        let assets = AssetCache::new(config.asset_cache_bytes);
        let responses = ResponseCache::new(config.response_cache_bytes);
        let batcher = RequestBatcher::new(fetcher);

        let monitor = NetworkConditionMonitor::with_table(config.profiles);
        monitor.attach(batcher.clone(), responses.clone());

        let (virtualizer, hint_rx) =
            ViewportVirtualizer::new(assets.clone(), config.virtualizer);
        let preloader =
            PredictivePreloader::new(batcher.clone(), responses.clone(), config.preloader);

        let probe = self.probe.unwrap_or_else(|| {
            let asset_source = assets.clone();
            let response_source = responses.clone();
            Arc::new(
                FootprintProbe::new()
                    .with_source(Arc::new(move || asset_source.size_used()))
                    .with_source(Arc::new(move || response_source.size_used())),
            )
        });

        let controller =
            MemoryPressureController::new(probe, config.memory_budget_bytes);
        register_cascade(
            &controller,
            &assets,
            &responses,
            &preloader,
            &virtualizer,
            self.model_trimmers,
        );

        {
            let controller = controller.clone();
            virtualizer.set_trim_hook(Arc::new(move || controller.optimize_now()));
        }

        let (connectivity_tx, connectivity_rx) = mpsc::channel(16);

        let tasks = vec![
            spawn_hint_pump(hint_rx, batcher.clone(), assets.clone()),
            monitor.spawn_listener(connectivity_rx),
            assets.spawn_sweeper(config.sweep_interval),
            responses.spawn_sweeper(config.sweep_interval),
            controller.spawn_sampler(config.sample_interval),
        ];

        PerfLayer {
            assets,
            responses,
            batcher,
            monitor,
            virtualizer,
            preloader,
            controller,
            connectivity_tx,
            tasks,
        }
    }
}

/// The assembled adaptive performance layer.
///
/// Owns the background tasks it spawned; dropping the layer (or calling
/// [`PerfLayer::shutdown`]) stops them.
pub struct PerfLayer {
    assets: AssetCache,
    responses: ResponseCache,
    batcher: RequestBatcher,
    monitor: NetworkConditionMonitor,
    virtualizer: ViewportVirtualizer,
    preloader: PredictivePreloader,
    controller: MemoryPressureController,
    connectivity_tx: mpsc::Sender<Connectivity>,
    tasks: Vec<JoinHandle<()>>,
}

impl PerfLayer {
    /// Start building a layer.
    pub fn builder() -> PerfLayerBuilder {
        PerfLayerBuilder {
            config: PerfConfig::default(),
            probe: None,
            model_trimmers: Vec::new(),
        }
    }

    /// Fetch through the response cache with stale-while-revalidate.
    ///
    /// A cached, unexpired value is returned immediately; if it is past
    /// its stale window a low-priority background refresh is started
    /// whose failure is logged and never surfaced. On a miss the request
    /// goes through the batcher at the caller's priority and the result
    /// is cached. Offline with no cached value yields
    /// [`FetchError::Offline`].
    pub async fn fetch_cached(
        &self,
        endpoint: &str,
        params: RequestParams,
        priority: RequestPriority,
    ) -> Result<Payload, FetchError> {
        if let Some(body) = self.responses.get_cached(endpoint) {
            if self.responses.should_revalidate(endpoint) {
                self.spawn_revalidation(endpoint, params);
            }
            return Ok(body);
        }

        let payload = self.batcher.request(endpoint, params, priority).await?;
        self.responses.insert(endpoint.to_string(), payload.to_vec());
        Ok(payload)
    }

    /// Kick off a background refresh for a stale entry.
    fn spawn_revalidation(&self, endpoint: &str, params: RequestParams) {
        let batcher = self.batcher.clone();
        let responses = self.responses.clone();
        let endpoint = endpoint.to_string();
        tokio::spawn(async move {
            match batcher
                .request(&endpoint, params, RequestPriority::Low)
                .await
            {
                Ok(payload) => {
                    responses.insert(endpoint, payload.to_vec());
                }
                Err(error) => {
                    // The caller already got the stale value; staleness
                    // stays invisible.
                    tracing::warn!(%endpoint, %error, "background revalidation failed");
                    responses.abandon_revalidation(&endpoint);
                }
            }
        });
    }

    /// Channel for the platform's connectivity-change events.
    pub fn connectivity_sender(&self) -> mpsc::Sender<Connectivity> {
        self.connectivity_tx.clone()
    }

    /// Forward an OS low-memory signal into the pressure controller.
    pub fn on_low_memory(&self) {
        self.controller.on_low_memory_signal();
    }

    /// Collect a read-only diagnostics snapshot.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot::collect(
            &self.assets,
            &self.responses,
            &self.batcher,
            &self.monitor,
            &self.controller,
            &self.virtualizer,
            &self.preloader,
        )
    }

    /// The asset cache.
    pub fn assets(&self) -> &AssetCache {
        &self.assets
    }

    /// The response cache.
    pub fn responses(&self) -> &ResponseCache {
        &self.responses
    }

    /// The request batcher.
    pub fn batcher(&self) -> &RequestBatcher {
        &self.batcher
    }

    /// The connectivity monitor.
    pub fn monitor(&self) -> &NetworkConditionMonitor {
        &self.monitor
    }

    /// The viewport virtualizer.
    pub fn virtualizer(&self) -> &ViewportVirtualizer {
        &self.virtualizer
    }

    /// The predictive preloader.
    pub fn preloader(&self) -> &PredictivePreloader {
        &self.preloader
    }

    /// The memory-pressure controller.
    pub fn controller(&self) -> &MemoryPressureController {
        &self.controller
    }

    /// Stop the background tasks.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for PerfLayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Register the fixed-order cleanup cascade.
///
/// Order is deliberate: cheapest, least user-visible actions first,
/// escalating toward actions that can cause visible refetch stalls.
fn register_cascade(
    controller: &MemoryPressureController,
    assets: &AssetCache,
    responses: &ResponseCache,
    preloader: &PredictivePreloader,
    virtualizer: &ViewportVirtualizer,
    model_trimmers: Vec<ModelTrimmer>,
) {
    let step_assets = assets.clone();
    controller.add_step(CleanupStep::new(
        "asset-cache",
        Box::new(move |_aggressive| step_assets.on_memory_warning()),
    ));

    let step_responses = responses.clone();
    controller.add_step(CleanupStep::new(
        "response-cache",
        Box::new(move |_aggressive| step_responses.invalidate_stale()),
    ));

    let step_preloader = preloader.clone();
    controller.add_step(CleanupStep::new(
        "preloads",
        Box::new(move |_aggressive| step_preloader.cancel_pending()),
    ));

    let step_virtualizer = virtualizer.clone();
    controller.add_step(CleanupStep::new(
        "view-records",
        Box::new(move |aggressive| step_virtualizer.purge_stale_invisible(aggressive)),
    ));

    if !model_trimmers.is_empty() {
        controller.add_step(CleanupStep::new(
            "model-caches",
            Box::new(move |aggressive| {
                model_trimmers.iter().map(|trimmer| trimmer(aggressive)).sum()
            }),
        ));
    }
}

/// Pump virtualizer preload hints through the batcher into the asset
/// cache at normal priority.
fn spawn_hint_pump(
    mut hints: mpsc::UnboundedReceiver<PreloadHint>,
    batcher: RequestBatcher,
    assets: AssetCache,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(hint) = hints.recv().await {
            if assets.contains(&hint.locator) {
                continue;
            }
            let batcher = batcher.clone();
            let assets = assets.clone();
            tokio::spawn(async move {
                match batcher
                    .request(&hint.locator, Vec::new(), RequestPriority::Normal)
                    .await
                {
                    Ok(payload) => {
                        assets.insert(hint.locator, AssetBlob::new(payload.to_vec()));
                    }
                    Err(error) => {
                        tracing::debug!(locator = %hint.locator, %error, "asset preload failed");
                    }
                }
            });
        }
    })
}
