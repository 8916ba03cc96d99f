//! Runtime configuration.
//!
//! Loaded from a JSON file next to the binary; every field has a default so
//! a missing file just means stock settings.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Monitor channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// QMP endpoint host.
    pub host: String,
    /// QMP endpoint port.
    pub port: u16,
    /// Per-request socket timeout in milliseconds.
    pub timeout_ms: u64,
    /// Minimum spacing between monitor requests in milliseconds.
    /// Requests issued faster than this are delayed, not dropped.
    pub min_request_interval_ms: u64,
    /// Requests-per-second level above which a diagnostic warning is logged.
    pub request_rate_warn_threshold: u32,
    /// Reconnect attempts before giving up.
    pub reconnect_attempts: u32,
    /// Delay between reconnect attempts in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4444,
            timeout_ms: 500,
            min_request_interval_ms: 5,
            request_rate_warn_threshold: 100,
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
        }
    }
}

/// Contiguous guest-RAM mapping assumption.
///
/// The guest's primary RAM region is assumed to be mapped as one contiguous
/// block in host memory, so addresses at or above `guest_base` can be
/// resolved by constant offset from the base mapping instead of a monitor
/// round trip. This holds for the supported emulator but is not guaranteed
/// by anything; a different host runtime should disable it and fall back to
/// per-address translation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ContiguousRam {
    pub enabled: bool,
    pub guest_base: u64,
}

impl Default for ContiguousRam {
    fn default() -> Self {
        Self {
            enabled: true,
            guest_base: 0x8000_0000,
        }
    }
}

/// Polling loop settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Sleep between tick-counter polls when the counter has not moved,
    /// in microseconds. Bounds CPU usage without giving up low-latency
    /// tick detection.
    pub idle_sleep_us: u64,
    /// Warn when one tick's sample-and-diff takes longer than this (ms).
    pub tick_budget_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            idle_sleep_us: 200,
            tick_budget_ms: 33,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub contiguous_ram: ContiguousRam,
    pub poll: PollConfig,
    /// Proximity threshold for matching a fresh spawn to a spawn point,
    /// in world units.
    pub spawn_proximity: f32,
    /// Directory for per-game event logs. Empty disables recording.
    pub sessions_dir: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it is missing
    /// or malformed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl Config {
    pub fn spawn_proximity_or_default(&self) -> f32 {
        if self.spawn_proximity > 0.0 {
            self.spawn_proximity
        } else {
            0.2
        }
    }
}
