//! Telemetry publishing.
//!
//! Decides when observers are notified and builds the snapshot they get.
//!
//! - Meter: hysteresis.  Publish when the power moved by at least
//!   `delta` since the last publish, or after `max_silent_ticks` ticks of
//!   silence.  Both halves of [`PublishState`] reset together on publish.
//! - Transformer: every tick, after the policy ran.

use crate::classifier::FaultClass;
use crate::rpc::codec::SenmlPack;
use crate::sim::transformer::TransformerFrame;

/// The only memory the hysteresis rule needs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PublishState {
    pub last_published: f32,
    pub elapsed_ticks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PublishRule {
    Hysteresis { delta: f32, max_silent_ticks: u32 },
    EveryTick,
}

pub struct TelemetryPublisher {
    rule: PublishRule,
    state: PublishState,
}

impl TelemetryPublisher {
    pub fn new(rule: PublishRule) -> Self {
        Self {
            rule,
            state: PublishState::default(),
        }
    }

    /// Start from a known state (tests, restored devices).
    pub fn with_state(rule: PublishRule, state: PublishState) -> Self {
        Self { rule, state }
    }

    /// Count one tick and decide whether `value` is published.  On `true`
    /// the state already records `value` as the last published one.
    pub fn should_publish(&mut self, value: f32) -> bool {
        let publish = match self.rule {
            PublishRule::EveryTick => true,
            PublishRule::Hysteresis {
                delta,
                max_silent_ticks,
            } => {
                self.state.elapsed_ticks = self.state.elapsed_ticks.saturating_add(1);
                (value - self.state.last_published).abs() >= delta
                    || self.state.elapsed_ticks >= max_silent_ticks
            }
        };
        if publish {
            self.state = PublishState {
                last_published: value,
                elapsed_ticks: 0,
            };
        }
        publish
    }

    /// Forget history, as after a blackout.
    pub fn reset(&mut self) {
        self.state = PublishState::default();
    }

    pub fn state(&self) -> PublishState {
        self.state
    }
}

// ───────────────────────────────────────────────────────────────
// Snapshots
// ───────────────────────────────────────────────────────────────

pub fn meter_snapshot(base_name: &str, instant_power: f32) -> SenmlPack {
    SenmlPack::new(base_name, Some("W")).with("power", None, instant_power)
}

pub fn transformer_snapshot(base_name: &str, class: FaultClass, frame: &TransformerFrame) -> SenmlPack {
    SenmlPack::new(base_name, None)
        .with("state", None, f32::from(class as u8))
        .with("current_A", Some("MA"), frame.ia)
        .with("current_B", None, frame.ib)
        .with("current_C", None, frame.ic)
        .with("voltage_A", Some("V"), frame.va)
        .with("voltage_B", Some("MV"), frame.vb)
        .with("voltage_C", Some("MV"), frame.vc)
}
