//! Per-controller connection settings.
//!
//! # TOML Example
//!
//! ```toml
//! name = "bench-a"
//! vendor = "simulation"
//! poll_interval_ms = 100
//! stale_delay_ms = 20
//! reply_timeout_ms = 500
//!
//! [simulation]
//! backlash_steps = 4.0
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vernier_common::config::ConfigError;
use vernier_common::consts::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_REPLY_TIMEOUT_MS, DEFAULT_STALE_DELAY_MS,
    MIN_POLL_INTERVAL_MS, MIN_STALE_DELAY_MS,
};

use crate::drivers::simulation::SimulationConfig;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_stale_delay_ms() -> u64 {
    DEFAULT_STALE_DELAY_MS
}

fn default_reply_timeout_ms() -> u64 {
    DEFAULT_REPLY_TIMEOUT_MS
}

/// Connection and polling settings for one controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Unique controller name, used for the worker thread and logs.
    pub name: String,

    /// Vendor name looked up in the `DriverRegistry`.
    pub vendor: String,

    /// Status poll interval while any axis is moving.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay before the first status poll after a move or jog.
    #[serde(default = "default_stale_delay_ms")]
    pub stale_delay_ms: u64,

    /// Time to wait for each controller reply.
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    /// Simulated stage settings (vendor `simulation` only).
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl ControllerConfig {
    /// Config with default timing for the given vendor.
    pub fn new(name: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vendor: vendor.into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stale_delay_ms: DEFAULT_STALE_DELAY_MS,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
            simulation: SimulationConfig::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_delay(&self) -> Duration {
        Duration::from_millis(self.stale_delay_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// # Errors
    ///
    /// `ConfigError::ValidationError` if:
    /// - `name` or `vendor` is empty
    /// - `poll_interval_ms` is faster than the maximum poll rate allows
    /// - `stale_delay_ms` is below one scheduler quantum
    /// - `reply_timeout_ms` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "controller name cannot be empty".to_string(),
            ));
        }
        if self.vendor.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "controller '{}': vendor cannot be empty",
                self.name
            )));
        }
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(ConfigError::ValidationError(format!(
                "controller '{}': poll_interval_ms {} below minimum {}",
                self.name, self.poll_interval_ms, MIN_POLL_INTERVAL_MS
            )));
        }
        if self.stale_delay_ms < MIN_STALE_DELAY_MS {
            return Err(ConfigError::ValidationError(format!(
                "controller '{}': stale_delay_ms must be >= {}",
                self.name, MIN_STALE_DELAY_MS
            )));
        }
        if self.reply_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "controller '{}': reply_timeout_ms must be > 0",
                self.name
            )));
        }
        self.simulation.validate()
    }
}
