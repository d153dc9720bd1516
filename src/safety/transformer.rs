//! Transformer policy.
//!
//! | Class | State        | Indicator      | Simulation mode |
//! |-------|--------------|----------------|-----------------|
//! | 0     | Ok           | green          | Correct         |
//! | 1     | Warning      | yellow         | Repair(One)     |
//! | 2     | Warning      | yellow         | Repair(Two)     |
//! | 3     | WarningBlink | blue, blinking | Repair(Three)   |
//! | 4     | Critical     | red            | Unrepairable    |
//!
//! Class 4 is the only one the transformer cannot fix by itself.  The
//! policy counts consecutive class-4 ticks; once the count exceeds the
//! threshold and no disconnect session is in flight it asks for exactly
//! one session and starts counting again from zero.  While a session is
//! running the counter is held at zero, so a new session needs a fresh
//! run of class-4 ticks after the current one ends.

use log::warn;

use crate::classifier::FaultClass;
use crate::drivers::indicator::{IndicatorEffect, LedMask};
use crate::sim::transformer::{RepairMode, TransformerMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformerState {
    Ok,
    Warning,
    WarningBlink,
    Critical,
}

impl TransformerState {
    pub fn of(class: FaultClass) -> Self {
        match class {
            FaultClass::Nominal => Self::Ok,
            FaultClass::Minor | FaultClass::Major => Self::Warning,
            FaultClass::Severe => Self::WarningBlink,
            FaultClass::Unrepairable => Self::Critical,
        }
    }

    pub fn effect(self) -> IndicatorEffect {
        match self {
            Self::Ok => IndicatorEffect::Solid(LedMask::GREEN),
            Self::Warning => IndicatorEffect::Solid(LedMask::YELLOW),
            Self::WarningBlink => IndicatorEffect::Toggle(LedMask::BLUE),
            Self::Critical => IndicatorEffect::Solid(LedMask::RED),
        }
    }
}

/// Simulation mode used to move the readings after `class` was seen.
pub fn mode_for(class: FaultClass) -> TransformerMode {
    match class {
        FaultClass::Nominal => TransformerMode::Correct,
        FaultClass::Minor => TransformerMode::Repair(RepairMode::One),
        FaultClass::Major => TransformerMode::Repair(RepairMode::Two),
        FaultClass::Severe => TransformerMode::Repair(RepairMode::Three),
        FaultClass::Unrepairable => TransformerMode::Unrepairable,
    }
}

/// Result of one policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformerVerdict {
    pub state: TransformerState,
    pub mode: TransformerMode,
    /// Set on the single tick a disconnect session must start.
    pub start_session: bool,
}

pub struct TransformerPolicy {
    threshold_ticks: u32,
    critical_ticks: u32,
}

impl TransformerPolicy {
    pub fn new(threshold_ticks: u32) -> Self {
        Self {
            threshold_ticks,
            critical_ticks: 0,
        }
    }

    pub fn evaluate(&mut self, class: FaultClass, session_active: bool) -> TransformerVerdict {
        let state = TransformerState::of(class);
        let mut start_session = false;

        if class != FaultClass::Unrepairable || session_active {
            self.critical_ticks = 0;
        } else {
            self.critical_ticks = self.critical_ticks.saturating_add(1);
            if self.critical_ticks > self.threshold_ticks {
                warn!(
                    "Transformer: class 4 for {} consecutive ticks, disconnecting house",
                    self.critical_ticks
                );
                self.critical_ticks = 0;
                start_session = true;
            }
        }

        TransformerVerdict {
            state,
            mode: mode_for(class),
            start_session,
        }
    }

    /// Consecutive class-4 ticks seen so far.
    pub fn critical_ticks(&self) -> u32 {
        self.critical_ticks
    }
}
