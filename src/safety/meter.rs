//! House meter policy.
//!
//! States are evaluated in order; the first match wins:
//!
//! ```text
//!   activated == false          → Disabled       (yellow)
//!   overload latched            → Overload       (red)
//!   p < 0                       → Exporting      (green)
//!   0 ≤ p < max − margin        → SafeImport     (blue)
//!   max − margin ≤ p ≤ max      → WarningImport  (red, blinking)
//!   p > max                     → Overload       (red, latches)
//! ```
//!
//! The latch survives every subsequent reading until [`MeterPolicy::reset`]
//! is called by the long-press reset sequence.

use log::error;

use crate::drivers::indicator::{IndicatorEffect, LedMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterState {
    Disabled,
    Exporting,
    SafeImport,
    WarningImport,
    Overload,
}

impl MeterState {
    pub fn effect(self) -> IndicatorEffect {
        match self {
            Self::Disabled => IndicatorEffect::Solid(LedMask::YELLOW),
            Self::Exporting => IndicatorEffect::Solid(LedMask::GREEN),
            Self::SafeImport => IndicatorEffect::Solid(LedMask::BLUE),
            Self::WarningImport => IndicatorEffect::Toggle(LedMask::RED),
            Self::Overload => IndicatorEffect::Solid(LedMask::RED),
        }
    }
}

/// Classify one reading, ignoring the latch.
pub fn classify(activated: bool, instant_power: f32, max_power: i32, margin: i32) -> MeterState {
    if !activated {
        MeterState::Disabled
    } else if instant_power < 0.0 {
        MeterState::Exporting
    } else if instant_power < (max_power - margin) as f32 {
        MeterState::SafeImport
    } else if instant_power <= max_power as f32 {
        MeterState::WarningImport
    } else {
        MeterState::Overload
    }
}

/// Meter safety policy with its sticky overload latch.
pub struct MeterPolicy {
    warning_margin_w: i32,
    overload_latched: bool,
}

impl MeterPolicy {
    pub fn new(warning_margin_w: i32) -> Self {
        Self {
            warning_margin_w,
            overload_latched: false,
        }
    }

    /// Evaluate one tick.  An overload reading sets the latch.
    pub fn evaluate(&mut self, activated: bool, instant_power: f32, max_power: i32) -> MeterState {
        if !activated {
            return MeterState::Disabled;
        }
        if self.overload_latched {
            return MeterState::Overload;
        }
        let state = classify(activated, instant_power, max_power, self.warning_margin_w);
        if state == MeterState::Overload {
            error!(
                "Meter: overload {:.0} W > {} W, latching until reset",
                instant_power, max_power
            );
            self.overload_latched = true;
        }
        state
    }

    pub fn is_overloaded(&self) -> bool {
        self.overload_latched
    }

    /// Clear the latch (end of the long-press reset sequence).
    pub fn reset(&mut self) {
        self.overload_latched = false;
    }
}
