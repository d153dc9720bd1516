//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade, one `TAG | key=value` line per event.  Observer
//! notifications are rendered as their JSON text.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
pub struct LogEventSink {
    device: &'static str,
}

impl LogEventSink {
    pub fn new(device: &'static str) -> Self {
        Self { device }
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        let dev = self.device;
        match event {
            AppEvent::Registered {
                activated,
                max_power,
            } => {
                info!("REG   | {dev} | activated={activated:?} max_power={max_power:?}");
            }
            AppEvent::Notify { resource, payload } => {
                info!(
                    "NOTIFY| {dev} | {resource} {}",
                    core::str::from_utf8(payload).unwrap_or("<binary>")
                );
            }
            AppEvent::MeterStateChanged { from, to, power_w } => {
                info!("STATE | {dev} | {from:?} -> {to:?} | power={power_w:.1}W");
            }
            AppEvent::TransformerStateChanged { from, to, class } => {
                info!("STATE | {dev} | {from:?} -> {to:?} | class={class}");
            }
            AppEvent::Indicator(leds) => {
                info!("LED   | {dev} | {leds}");
            }
            AppEvent::ActivationChanged { previous, now } => {
                info!("STATUS| {dev} | {previous} -> {now}");
            }
            AppEvent::MaxPowerChanged { max_power } => {
                info!("LIMIT | {dev} | max_power={max_power}W");
            }
            AppEvent::LoadsChanged { loads } => {
                info!("LOADS | {dev} | loads={loads}");
            }
            AppEvent::ResetCountdownStarted => {
                info!("RESET | {dev} | countdown started");
            }
            AppEvent::ResetCountdownFinished => {
                info!("RESET | {dev} | done");
            }
            AppEvent::ManualFaultSelected(class) => {
                info!("FAULT | {dev} | selected={class}");
            }
            AppEvent::ManualFaultInjected(class) => {
                info!("FAULT | {dev} | injected={class}");
            }
            AppEvent::ClassifierRejected(e) => {
                warn!("CLASS | {dev} | rejected: {e}");
            }
            AppEvent::SessionStarted => {
                info!("SESS  | {dev} | started");
            }
            AppEvent::SessionCooldown { remaining } => {
                info!("SESS  | {dev} | cooldown remaining={remaining}");
            }
            AppEvent::SessionFinished(outcome) => {
                info!("SESS  | {dev} | finished: {outcome}");
            }
        }
    }
}

/// Forwards every event to both sinks, e.g. logging plus observer fan-out.
pub struct Tee<A, B>(pub A, pub B);

impl<A: EventSink, B: EventSink> EventSink for Tee<A, B> {
    fn emit(&mut self, event: &AppEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}
