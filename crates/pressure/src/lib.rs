//! Fieldside Memory Pressure Library
//!
//! Samples process memory usage, classifies it into pressure tiers, and
//! runs an ordered cascade of cleanup actions across the caches when
//! pressure rises or the platform raises a low-memory signal.

mod controller;
mod probe;

pub use controller::{
    CleanupStep, ControllerStats, MemoryPressureController, MemoryStats, PressureTier,
};
pub use probe::{FixedProbe, FootprintProbe, MemoryProbe, MemorySample, ProcStatusProbe};
