//! Seams between the device services and the host.
//!
//! ```text
//!   adapters ──▶ port traits ──▶ MeterService / TransformerService
//! ```
//!
//! Services take ports as generic arguments per call.  Peer traffic goes
//! through [`Link`](crate::rpc::transport::Link) in `rpc`, not here.

use crate::config::DeviceConfig;
use crate::drivers::indicator::LedMask;

use super::events::AppEvent;

// ── Indicator ─────────────────────────────────────────────────

/// Receives the complete set of LEDs that should be lit.
pub trait IndicatorPort {
    fn set_leds(&mut self, leds: LedMask);
}

// ── Events ────────────────────────────────────────────────────

/// Where services report what happened.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: &AppEvent) {
        (**self).emit(event);
    }
}

// ── Config storage ────────────────────────────────────────────

/// Stored device settings.  `save` rejects a config that fails
/// [`DeviceConfig::validate`]; nothing is clamped.
pub trait ConfigPort {
    /// Missing storage yields [`DeviceConfig::default()`].
    fn load(&self) -> Result<DeviceConfig, ConfigError>;

    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored bytes are not a valid config document.
    Corrupted,
    /// Field name and reason.
    ValidationFailed(&'static str),
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => f.write_str("stored config is unreadable"),
            Self::ValidationFailed(msg) => write!(f, "invalid config: {msg}"),
            Self::IoError => f.write_str("config storage I/O failed"),
        }
    }
}

impl std::error::Error for ConfigError {}
