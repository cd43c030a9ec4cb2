//! Performance layer configuration
//!
//! Centralized startup configuration for cache budgets, sampling
//! intervals, and virtualization. Values can come from code, environment
//! variables, or a small key/value config file. Everything here is read
//! once at construction; the only runtime mutation of behavior is the
//! connectivity monitor swapping optimization profiles.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use fieldside_net::ProfileTable;
use fieldside_view::{PreloaderConfig, VirtualizerConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value could not be parsed.
    #[error("invalid value for {0}")]
    InvalidValue(String),

    /// The config file could not be read.
    #[error("failed to read config file")]
    IoError(#[from] io::Error),
}

/// Configuration for the performance layer.
///
/// # Example
///
/// ```
/// use fieldside_core::PerfConfig;
///
/// let config = PerfConfig::default()
///     .with_asset_cache_mb(32)
///     .with_memory_budget_mb(128);
///
/// assert_eq!(config.asset_cache_bytes, 32 * 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct PerfConfig {
    /// Asset cache byte budget.
    pub asset_cache_bytes: usize,

    /// Response cache byte budget.
    pub response_cache_bytes: usize,

    /// Process memory budget the pressure tiers are classified against.
    pub memory_budget_bytes: usize,

    /// Interval between expired-entry sweeps.
    pub sweep_interval: Duration,

    /// Interval between memory pressure samples.
    pub sample_interval: Duration,

    /// Virtualizer tuning.
    pub virtualizer: VirtualizerConfig,

    /// Preloader tuning.
    pub preloader: PreloaderConfig,

    /// Optimization profiles selected by the connectivity monitor.
    pub profiles: ProfileTable,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            asset_cache_bytes: 64 * 1024 * 1024,
            response_cache_bytes: 16 * 1024 * 1024,
            memory_budget_bytes: 256 * 1024 * 1024,
            sweep_interval: Duration::from_secs(60),
            sample_interval: Duration::from_secs(5),
            virtualizer: VirtualizerConfig::default(),
            preloader: PreloaderConfig::default(),
            profiles: ProfileTable::default(),
        }
    }
}

impl PerfConfig {
    /// Sets the asset cache budget in megabytes.
    pub fn with_asset_cache_mb(mut self, mb: usize) -> Self {
        self.asset_cache_bytes = mb * 1024 * 1024;
        self
    }

    /// Sets the response cache budget in megabytes.
    pub fn with_response_cache_mb(mut self, mb: usize) -> Self {
        self.response_cache_bytes = mb * 1024 * 1024;
        self
    }

    /// Sets the memory budget in megabytes.
    pub fn with_memory_budget_mb(mut self, mb: usize) -> Self {
        self.memory_budget_bytes = mb * 1024 * 1024;
        self
    }

    /// Sets the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the memory sampling interval.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Sets the virtualizer buffer window.
    pub fn with_virtualizer_buffer(mut self, buffer: usize) -> Self {
        self.virtualizer.buffer = buffer;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FIELDSIDE_ASSET_CACHE_MB`: asset cache budget in MB (default: 64)
    /// - `FIELDSIDE_RESPONSE_CACHE_MB`: response cache budget in MB (default: 16)
    /// - `FIELDSIDE_MEMORY_BUDGET_MB`: memory budget in MB (default: 256)
    /// - `FIELDSIDE_SWEEP_INTERVAL_SECS`: sweep interval (default: 60)
    /// - `FIELDSIDE_SAMPLE_INTERVAL_SECS`: sampling interval (default: 5)
    /// - `FIELDSIDE_VIRTUALIZER_BUFFER`: buffer window size (default: 5)
    ///
    /// # Errors
    /// Returns an error if any variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FIELDSIDE_ASSET_CACHE_MB") {
            config.asset_cache_bytes = parse_usize(&val, "FIELDSIDE_ASSET_CACHE_MB")? * 1024 * 1024;
        }
        if let Ok(val) = std::env::var("FIELDSIDE_RESPONSE_CACHE_MB") {
            config.response_cache_bytes =
                parse_usize(&val, "FIELDSIDE_RESPONSE_CACHE_MB")? * 1024 * 1024;
        }
        if let Ok(val) = std::env::var("FIELDSIDE_MEMORY_BUDGET_MB") {
            config.memory_budget_bytes =
                parse_usize(&val, "FIELDSIDE_MEMORY_BUDGET_MB")? * 1024 * 1024;
        }
        if let Ok(val) = std::env::var("FIELDSIDE_SWEEP_INTERVAL_SECS") {
            config.sweep_interval =
                Duration::from_secs(parse_usize(&val, "FIELDSIDE_SWEEP_INTERVAL_SECS")? as u64);
        }
        if let Ok(val) = std::env::var("FIELDSIDE_SAMPLE_INTERVAL_SECS") {
            config.sample_interval =
                Duration::from_secs(parse_usize(&val, "FIELDSIDE_SAMPLE_INTERVAL_SECS")? as u64);
        }
        if let Ok(val) = std::env::var("FIELDSIDE_VIRTUALIZER_BUFFER") {
            config.virtualizer.buffer = parse_usize(&val, "FIELDSIDE_VIRTUALIZER_BUFFER")?;
        }

        Ok(config)
    }

    /// Loads configuration from a key/value file.
    ///
    /// Expected file format:
    /// ```toml
    /// asset_cache_mb = 64
    /// response_cache_mb = 16
    /// memory_budget_mb = 256
    /// sweep_interval_secs = 60
    /// sample_interval_secs = 5
    /// virtualizer_buffer = 5
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_kv(&contents)
    }

    /// Parses configuration from a key/value string.
    fn from_kv(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "asset_cache_mb" => {
                        config.asset_cache_bytes = parse_usize(value, key)? * 1024 * 1024;
                    }
                    "response_cache_mb" => {
                        config.response_cache_bytes = parse_usize(value, key)? * 1024 * 1024;
                    }
                    "memory_budget_mb" => {
                        config.memory_budget_bytes = parse_usize(value, key)? * 1024 * 1024;
                    }
                    "sweep_interval_secs" => {
                        config.sweep_interval =
                            Duration::from_secs(parse_usize(value, key)? as u64);
                    }
                    "sample_interval_secs" => {
                        config.sample_interval =
                            Duration::from_secs(parse_usize(value, key)? as u64);
                    }
                    "virtualizer_buffer" => {
                        config.virtualizer.buffer = parse_usize(value, key)?;
                    }
                    _ => {} // Ignore unknown keys
                }
            }
        }

        Ok(config)
    }
}

fn parse_usize(value: &str, key: &str) -> Result<usize, ConfigError> {
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}
