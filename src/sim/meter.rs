//! House meter readings.
//!
//! Production follows a small solar-like source (7–8 A), consumption is
//! driven by the number of switched-on loads.  Power is signed: negative
//! means the house exports.

use rand::Rng;

use super::{SafeRange, gradual_variation, pull_toward, random_in};

pub const VOLTAGE: SafeRange = SafeRange::new(225.0, 230.0);
pub const VOLTAGE_STEP: f32 = 0.5;
pub const PRODUCED: SafeRange = SafeRange::new(7.0, 8.0);
pub const PRODUCED_STEP: f32 = 0.1;
pub const POWER_FACTOR: SafeRange = SafeRange::new(0.8, 1.0);
pub const POWER_FACTOR_STEP: f32 = 0.05;
pub const CONSUMED_STEP: f32 = 0.05;

/// Current drawn by one load (≈1 kW at nominal voltage).
pub const LOAD_CURRENT_A: f32 = 3.2075;
/// Width of the consumption band above the nominal load draw.
pub const CONSUMPTION_SPREAD_A: f32 = 0.25;
/// Main breaker rating as a multiple of the contracted current budget.
pub const BREAKER_HEADROOM: f32 = 2.0;

/// Current budget for a contracted `max_power` at worst-case voltage and
/// power factor.
pub fn max_current_budget(max_power_w: i32) -> f32 {
    max_power_w as f32 / (VOLTAGE.min * POWER_FACTOR.min)
}

/// Readings for one meter tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterFrame {
    pub voltage: f32,
    pub current_consumed: f32,
    pub current_produced: f32,
    pub power_factor: f32,
    pub instant_power: f32,
}

impl MeterFrame {
    pub fn compute_power(voltage: f32, consumed: f32, produced: f32, power_factor: f32) -> f32 {
        voltage * (consumed - produced) * power_factor
    }

    /// Frame with both currents cut and no power flow.
    pub fn blackout(&self) -> Self {
        Self {
            current_consumed: 0.0,
            current_produced: 0.0,
            instant_power: 0.0,
            ..*self
        }
    }
}

/// What the simulator should do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterMode {
    /// House switched off by its operator or the grid: no power is metered.
    Disabled,
    /// Normal operation with `loads` switched on.
    Normal { loads: u32 },
    /// Overload latched: everything is cut until the reset sequence.
    Blackout,
}

/// Fresh frame after boot or after a reset sequence: no loads, random
/// production.
pub fn initial<R: Rng + ?Sized>(rng: &mut R) -> MeterFrame {
    let voltage = random_in(rng, VOLTAGE);
    let power_factor = random_in(rng, POWER_FACTOR);
    let current_produced = random_in(rng, PRODUCED);
    MeterFrame {
        voltage,
        current_consumed: 0.0,
        current_produced,
        power_factor,
        instant_power: MeterFrame::compute_power(voltage, 0.0, current_produced, power_factor),
    }
}

/// Re-randomise export capacity, keeping the rest of the frame.
pub fn rerandomize_production<R: Rng + ?Sized>(rng: &mut R, prev: &MeterFrame) -> MeterFrame {
    let current_produced = random_in(rng, PRODUCED);
    MeterFrame {
        current_produced,
        instant_power: MeterFrame::compute_power(
            prev.voltage,
            prev.current_consumed,
            current_produced,
            prev.power_factor,
        ),
        ..*prev
    }
}

/// Band the consumed current is steered into for `loads` switched-on loads.
pub fn consumption_band(loads: u32, max_current_a: f32) -> SafeRange {
    let breaker = max_current_a * BREAKER_HEADROOM;
    let low = (loads as f32 * LOAD_CURRENT_A).min(breaker);
    SafeRange::new(low, (low + CONSUMPTION_SPREAD_A).min(breaker.max(low)))
}

/// Next frame, computed only from the previous frame and the mode.
pub fn next<R: Rng + ?Sized>(
    rng: &mut R,
    prev: &MeterFrame,
    mode: MeterMode,
    max_current_a: f32,
) -> MeterFrame {
    match mode {
        MeterMode::Disabled => MeterFrame {
            instant_power: 0.0,
            ..*prev
        },
        MeterMode::Blackout => prev.blackout(),
        MeterMode::Normal { loads } => {
            let voltage = gradual_variation(rng, VOLTAGE, VOLTAGE_STEP, prev.voltage);
            let power_factor =
                gradual_variation(rng, POWER_FACTOR, POWER_FACTOR_STEP, prev.power_factor);
            let current_produced = if PRODUCED.contains(prev.current_produced) {
                gradual_variation(rng, PRODUCED, PRODUCED_STEP, prev.current_produced)
            } else {
                random_in(rng, PRODUCED)
            };
            let band = consumption_band(loads, max_current_a);
            let current_consumed = if band.contains(prev.current_consumed) {
                gradual_variation(rng, band, CONSUMED_STEP, prev.current_consumed)
            } else {
                let jump = SafeRange::new(LOAD_CURRENT_A, 2.0 * LOAD_CURRENT_A);
                pull_toward(rng, band, jump, prev.current_consumed)
            };
            MeterFrame {
                voltage,
                current_consumed,
                current_produced,
                power_factor,
                instant_power: MeterFrame::compute_power(
                    voltage,
                    current_consumed,
                    current_produced,
                    power_factor,
                ),
            }
        }
    }
}
