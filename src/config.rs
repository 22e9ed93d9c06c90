//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::time::Duration;

/// Default TTL applied when `set` is called with a zero TTL
const DEFAULT_TTL_MS: u64 = 300_000;

/// Default sweeper period
const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 1_000;

/// Cache construction parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TTL substituted for writes that pass `Duration::ZERO`; zero means never expire
    pub default_ttl: Duration,
    /// Sweeper period; zero disables background sweeping
    pub cleanup_interval: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `CLEANUP_INTERVAL_MS` - Sweep frequency in milliseconds (default: 1000)
    pub fn from_env() -> Self {
        Self {
            default_ttl: millis_from_env("DEFAULT_TTL_MS", DEFAULT_TTL_MS),
            cleanup_interval: millis_from_env("CLEANUP_INTERVAL_MS", DEFAULT_CLEANUP_INTERVAL_MS),
        }
    }

    /// Returns a copy with the given default TTL.
    pub fn with_default_ttl(mut self, default_ttl: Duration) -> Self {
        self.default_ttl = default_ttl;
        self
    }

    /// Returns a copy with the given sweeper period.
    pub fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_millis(DEFAULT_TTL_MS),
            cleanup_interval: Duration::from_millis(DEFAULT_CLEANUP_INTERVAL_MS),
        }
    }
}

fn millis_from_env(name: &str, default_ms: u64) -> Duration {
    let ms = env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}
