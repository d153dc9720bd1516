//! Device configuration parameters
//!
//! All tunable parameters for the meter and the transformer.  Values are
//! read from a JSON file by [`JsonConfigFile`](crate::adapters::config_file::JsonConfigFile);
//! every section carries `#[serde(default)]` so a partial file only
//! overrides what it names.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Top-level configuration shared by both device kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    // --- Timing ---
    /// Sensing tick period (milliseconds)
    pub sensing_period_ms: u32,
    /// Countdown / cooldown step (milliseconds)
    pub countdown_step_ms: u32,
    /// Number of countdown steps before sensing resumes
    pub countdown_ticks: u8,

    // --- Identity ---
    /// Human-readable alias sent at registration; per-device default when absent
    pub alias: Option<String>,
    /// 8-byte link-layer address; derived from the host name when absent
    pub link_address: Option<[u8; 8]>,
    /// RNG seed; a fixed seed makes runs reproducible
    pub seed: Option<u64>,

    pub link: LinkConfig,
    pub meter: MeterConfig,
    pub transformer: TransformerConfig,
}

/// Peer addresses and request budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Local bind address for the resource server
    pub bind: String,
    /// Registry peer address
    pub registry_peer: String,
    /// Registry resource path
    pub registry_path: String,
    /// Per-request response budget (milliseconds)
    pub request_timeout_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Max power budget until the registry or an operator sets one (W)
    pub default_max_power_w: i32,
    /// Width of the warning band below max power (W)
    pub warning_margin_w: i32,
    /// Minimum power change that triggers a notification (W)
    pub publish_delta_w: f32,
    /// Longest silence between notifications (seconds)
    pub max_silent_secs: u32,
    /// Hold time that disconnects every load (seconds)
    pub long_press_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    /// House meter peer address
    pub house_peer: String,
    /// House activation resource path
    pub house_status_path: String,
    /// Attempts per disconnect / reconnect phase
    pub max_attempts: u8,
    /// How long class 4 may persist before the house is disconnected (seconds)
    pub tolerable_fault_secs: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sensing_period_ms: 2000,
            countdown_step_ms: 1000,
            countdown_ticks: 5,
            alias: None,
            link_address: None,
            seed: None,
            link: LinkConfig::default(),
            meter: MeterConfig::default(),
            transformer: TransformerConfig::default(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5683".into(),
            registry_peer: "127.0.0.1:5690".into(),
            registry_path: "registration".into(),
            request_timeout_ms: 3000,
        }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            default_max_power_w: 6000,
            warning_margin_w: 1000,
            publish_delta_w: 1000.0,
            max_silent_secs: 60,
            long_press_secs: 5,
        }
    }
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            house_peer: "127.0.0.1:5683".into(),
            house_status_path: "status".into(),
            max_attempts: 3,
            tolerable_fault_secs: 10,
        }
    }
}

impl DeviceConfig {
    /// Configured alias, or `fallback` (e.g. `smart_meter_1`).
    pub fn alias_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.alias.as_deref().unwrap_or(fallback)
    }

    /// Ticks of silence after which the meter publishes regardless of delta.
    pub fn max_silent_ticks(&self) -> u32 {
        self.ticks_in(self.meter.max_silent_secs).max(1)
    }

    /// Consecutive class-4 ticks tolerated before a disconnect session starts.
    pub fn fault_threshold_ticks(&self) -> u32 {
        self.ticks_in(self.transformer.tolerable_fault_secs)
    }

    /// Whole sensing periods in `secs`, saturating at `u32::MAX`.
    fn ticks_in(&self, secs: u32) -> u32 {
        let ticks = u64::from(secs) * 1000 / u64::from(self.sensing_period_ms.max(1));
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }

    /// Reject values that would stall or flood the control loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=60_000).contains(&self.sensing_period_ms) {
            return Err(ConfigError::ValidationFailed(
                "sensing_period_ms must be 100–60000",
            ));
        }
        if !(10..=10_000).contains(&self.countdown_step_ms) {
            return Err(ConfigError::ValidationFailed(
                "countdown_step_ms must be 10–10000",
            ));
        }
        if self.countdown_ticks == 0 {
            return Err(ConfigError::ValidationFailed("countdown_ticks must be > 0"));
        }
        if self.alias.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::ValidationFailed("alias must not be empty"));
        }
        if self.link.registry_peer.is_empty() || self.link.registry_path.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "registry peer and path must not be empty",
            ));
        }
        if self.link.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "request_timeout_ms must be > 0",
            ));
        }
        if self.meter.default_max_power_w <= 0 {
            return Err(ConfigError::ValidationFailed(
                "default_max_power_w must be > 0",
            ));
        }
        if self.meter.warning_margin_w < 0 {
            return Err(ConfigError::ValidationFailed(
                "warning_margin_w must be >= 0",
            ));
        }
        if !(self.meter.publish_delta_w.is_finite() && self.meter.publish_delta_w > 0.0) {
            return Err(ConfigError::ValidationFailed(
                "publish_delta_w must be a positive number",
            ));
        }
        if self.meter.max_silent_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_silent_secs must be > 0",
            ));
        }
        if self.transformer.house_peer.is_empty() || self.transformer.house_status_path.is_empty()
        {
            return Err(ConfigError::ValidationFailed(
                "house peer and status path must not be empty",
            ));
        }
        if self.transformer.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed("max_attempts must be > 0"));
        }
        Ok(())
    }
}
