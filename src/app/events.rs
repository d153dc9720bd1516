//! Outbound application events.
//!
//! The device services emit these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log them, forward notifications to
//! observers or record them in tests.

use crate::classifier::FaultClass;
use crate::coordinator::SessionOutcome;
use crate::drivers::indicator::LedMask;
use crate::error::ClassifierError;
use crate::rpc::transport::Payload;
use crate::safety::meter::MeterState;
use crate::safety::transformer::TransformerState;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Registration handshake finished.
    Registered {
        activated: Option<bool>,
        max_power: Option<i32>,
    },

    /// Snapshot for observers of `resource`.
    Notify {
        resource: &'static str,
        payload: Payload,
    },

    /// Meter safety state changed.
    MeterStateChanged {
        from: Option<MeterState>,
        to: MeterState,
        power_w: f32,
    },

    /// Transformer safety state changed.
    TransformerStateChanged {
        from: Option<TransformerState>,
        to: TransformerState,
        class: FaultClass,
    },

    /// Indicator LEDs changed.
    Indicator(LedMask),

    /// Activation flag changed by `PUT status`.
    ActivationChanged { previous: bool, now: bool },

    /// Max power budget changed by `PUT max_power`.
    MaxPowerChanged { max_power: i32 },

    /// Number of switched-on loads changed.
    LoadsChanged { loads: u32 },

    /// Long-press reset started / finished.
    ResetCountdownStarted,
    ResetCountdownFinished,

    /// Manual fault selected on the transformer button.
    ManualFaultSelected(FaultClass),
    /// Manual fault readings injected on release.
    ManualFaultInjected(FaultClass),

    /// Classifier output rejected; the policy step was skipped.
    ClassifierRejected(ClassifierError),

    /// Disconnect session lifecycle.
    SessionStarted,
    SessionCooldown { remaining: u8 },
    SessionFinished(SessionOutcome),
}
