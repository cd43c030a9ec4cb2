//! Fieldside View Library
//!
//! Scroll-side half of the adaptive performance layer: the viewport
//! virtualizer that bounds list construction to the visible window and
//! drives asset preloading, and the predictive preloader that warms the
//! response cache for likely next screens.

mod cancel;
mod preloader;
mod virtualizer;

pub use cancel::CancelFlag;
pub use preloader::{PredictivePreloader, PreloaderConfig, PreloaderStats};
pub use virtualizer::{
    PreloadHint, ViewportVirtualizer, VirtualizerConfig, VirtualizerStats, VisibleRange,
};
