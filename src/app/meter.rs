//! House meter control loop.
//!
//! [`MeterService`] owns every piece of meter state: the current frame,
//! activation, max power budget, load count, overload latch and publish
//! history.  Nothing outside it mutates them; ports are injected at call
//! sites so the whole loop runs against mocks in tests.
//!
//! ```text
//!   Scheduler ──Sensing──▶ tick(): simulate → policy → indicator → publish
//!             ──Countdown─▶ countdown_step(): 5 steps, then reset + resume
//!   Button ──▶ on_button(): Press adds a load, Held > 5 s starts the reset
//!   Link   ──▶ handle():    GET power · PUT status · PUT max_power
//! ```

use log::{info, warn};
use rand::Rng;

use crate::config::DeviceConfig;
use crate::drivers::button::ButtonEvent;
use crate::drivers::indicator::{Indicator, IndicatorEffect};
use crate::error::ResourceError;
use crate::registration::{DeviceIdentity, RegistrationDocument, RegistrationRecord};
use crate::rpc::codec;
use crate::rpc::resources::{self, PreviousStatus, ResourceHandler};
use crate::rpc::transport::{Method, Request, Response, ResponseCode};
use crate::safety::meter::{MeterPolicy, MeterState};
use crate::scheduler::{Scheduler, TimerKind};
use crate::sim::meter::{self as sim, MeterFrame, MeterMode};
use crate::telemetry::{self, PublishRule, TelemetryPublisher};

use super::events::AppEvent;
use super::ports::{EventSink, IndicatorPort};

pub struct MeterService<R: Rng> {
    identity: DeviceIdentity,
    rng: R,
    frame: MeterFrame,
    activated: bool,
    max_power: i32,
    max_current: f32,
    loads: u32,
    policy: MeterPolicy,
    publisher: TelemetryPublisher,
    indicator: Indicator,
    scheduler: Scheduler,
    state: Option<MeterState>,
    countdown_remaining: u8,
    /// Events raised while answering requests, flushed on the next poll.
    outbox: Vec<AppEvent>,
    sensing_period_ms: u64,
    countdown_step_ms: u64,
    countdown_ticks: u8,
    long_press_secs: u32,
    tick_count: u64,
}

impl<R: Rng> MeterService<R> {
    pub fn new(config: &DeviceConfig, identity: DeviceIdentity, mut rng: R) -> Self {
        let frame = sim::initial(&mut rng);
        let max_power = config.meter.default_max_power_w;
        Self {
            identity,
            rng,
            frame,
            activated: true,
            max_power,
            max_current: sim::max_current_budget(max_power),
            loads: 0,
            policy: MeterPolicy::new(config.meter.warning_margin_w),
            publisher: TelemetryPublisher::new(PublishRule::Hysteresis {
                delta: config.meter.publish_delta_w,
                max_silent_ticks: config.max_silent_ticks(),
            }),
            indicator: Indicator::new(),
            scheduler: Scheduler::new(),
            state: None,
            countdown_remaining: 0,
            outbox: Vec::new(),
            sensing_period_ms: u64::from(config.sensing_period_ms),
            countdown_step_ms: u64::from(config.countdown_step_ms),
            countdown_ticks: config.countdown_ticks,
            long_press_secs: config.meter.long_press_secs,
            tick_count: 0,
        }
    }

    // ── Registration ──────────────────────────────────────────

    /// Document announcing this meter and its current defaults.
    pub fn registration_document(&self) -> RegistrationDocument {
        RegistrationDocument::new(&self.identity).with_meter_defaults(self.activated, self.max_power)
    }

    /// Adopt the defaults the registry handed back.
    pub fn apply_registration(&mut self, record: &RegistrationRecord) {
        if let Some(activated) = record.activated {
            self.activated = activated;
        }
        if let Some(max_power) = record.max_power {
            self.set_max_power(max_power);
        }
        info!(
            "Meter: registered, activated={} max_power={} W",
            self.activated, self.max_power
        );
        self.outbox.push(AppEvent::Registered {
            activated: record.activated,
            max_power: record.max_power,
        });
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Arm periodic sensing.  The first tick fires one period from `now_ms`.
    pub fn start(&mut self, now_ms: u64) {
        if let Err(e) = self.scheduler.switch_to(
            TimerKind::Sensing,
            now_ms,
            self.sensing_period_ms,
            self.sensing_period_ms,
        ) {
            warn!("Meter: cannot start sensing: {}", e);
        }
    }

    /// Run whatever timer is due.  Call from the main loop.
    pub fn poll(&mut self, now_ms: u64, hw: &mut impl IndicatorPort, sink: &mut impl EventSink) {
        self.flush(sink);
        match self.scheduler.poll(now_ms) {
            Some(TimerKind::Sensing) => self.tick(hw, sink),
            Some(TimerKind::Countdown) => self.countdown_step(now_ms, hw, sink),
            Some(TimerKind::Session) | None => {}
        }
    }

    /// Hand queued events to `sink`.
    pub fn flush(&mut self, sink: &mut impl EventSink) {
        for event in self.outbox.drain(..) {
            sink.emit(&event);
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// One sensing cycle: simulate → policy → indicator → publish.
    pub fn tick(&mut self, hw: &mut impl IndicatorPort, sink: &mut impl EventSink) {
        self.tick_count += 1;

        // 1. Simulate the next frame from the previous one
        let mode = if !self.activated {
            MeterMode::Disabled
        } else if self.policy.is_overloaded() {
            MeterMode::Blackout
        } else {
            MeterMode::Normal { loads: self.loads }
        };
        self.frame = sim::next(&mut self.rng, &self.frame, mode, self.max_current);

        // 2. Policy
        let was_latched = self.policy.is_overloaded();
        let state = self
            .policy
            .evaluate(self.activated, self.frame.instant_power, self.max_power);

        // 3. Indicator
        self.show(state.effect(), hw, sink);
        if self.state != Some(state) {
            sink.emit(&AppEvent::MeterStateChanged {
                from: self.state,
                to: state,
                power_w: self.frame.instant_power,
            });
            self.state = Some(state);
        }

        // 4. Publish under hysteresis
        if self.publisher.should_publish(self.frame.instant_power) {
            self.notify(sink);
        }

        // 5. A fresh overload cuts the house off until the reset sequence
        if !was_latched && self.policy.is_overloaded() {
            self.frame = self.frame.blackout();
            self.publisher.reset();
        }
    }

    /// One countdown step of the long-press reset.
    pub fn countdown_step(
        &mut self,
        now_ms: u64,
        hw: &mut impl IndicatorPort,
        sink: &mut impl EventSink,
    ) {
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining > 0 {
            info!("Meter: reset in {}", self.countdown_remaining);
            return;
        }

        self.show(IndicatorEffect::AllOn, hw, sink);
        self.policy.reset();
        self.frame = sim::rerandomize_production(&mut self.rng, &self.frame);
        self.publisher.reset();
        if let Err(e) = self.scheduler.switch_to(
            TimerKind::Sensing,
            now_ms,
            self.sensing_period_ms,
            self.sensing_period_ms,
        ) {
            warn!("Meter: cannot resume sensing: {}", e);
        }
        info!("Meter: reset complete, sensing resumed");
        sink.emit(&AppEvent::ResetCountdownFinished);
    }

    // ── Inbound events ────────────────────────────────────────

    pub fn on_button(&mut self, event: ButtonEvent, now_ms: u64, sink: &mut impl EventSink) {
        if !self.activated || self.in_countdown() {
            return;
        }
        match event {
            ButtonEvent::Press => {
                if self.policy.is_overloaded() {
                    warn!("Meter: overloaded, load not added");
                    return;
                }
                self.loads += 1;
                info!("Meter: load added, {} on", self.loads);
                sink.emit(&AppEvent::LoadsChanged { loads: self.loads });
            }
            ButtonEvent::Held { secs } if secs > self.long_press_secs => {
                self.loads = 0;
                self.countdown_remaining = self.countdown_ticks;
                if let Err(e) = self.scheduler.switch_to(
                    TimerKind::Countdown,
                    now_ms,
                    self.countdown_step_ms,
                    self.countdown_step_ms,
                ) {
                    warn!("Meter: cannot start reset countdown: {}", e);
                    return;
                }
                info!("Meter: all loads disconnected, reset countdown started");
                sink.emit(&AppEvent::LoadsChanged { loads: 0 });
                sink.emit(&AppEvent::ResetCountdownStarted);
            }
            ButtonEvent::Held { .. } | ButtonEvent::Release { .. } => {}
        }
    }

    // ── Resources ─────────────────────────────────────────────

    fn put_status(&mut self, request: &Request) -> Result<Response, ResourceError> {
        let status = resources::parse_status(&request.payload)?;
        let previous = self.activated;
        self.activated = status;
        info!("Meter: status {} -> {}", previous, status);
        self.outbox.push(AppEvent::ActivationChanged {
            previous,
            now: status,
        });
        Ok(Response::json(
            ResponseCode::Changed,
            &PreviousStatus {
                previous_status: previous,
            },
        ))
    }

    fn put_max_power(&mut self, request: &Request) -> Result<Response, ResourceError> {
        let max_power = resources::parse_max_power(&request.payload)?;
        self.set_max_power(max_power);
        info!(
            "Meter: max_power {} W, current budget {:.2} A",
            max_power, self.max_current
        );
        self.outbox.push(AppEvent::MaxPowerChanged { max_power });
        Ok(Response::empty(ResponseCode::Changed))
    }

    fn route(&mut self, request: &Request) -> Result<Response, ResourceError> {
        match (request.path.as_str(), request.method) {
            (resources::POWER | resources::POWER_OBS, Method::Get) => Ok(Response::json(
                ResponseCode::Content,
                &self.snapshot(),
            )),
            (resources::STATUS, Method::Put) => self.put_status(request),
            (resources::MAX_POWER, Method::Put) => self.put_max_power(request),
            (resources::POWER | resources::POWER_OBS | resources::STATUS | resources::MAX_POWER, _) => {
                Err(ResourceError::MethodNotAllowed)
            }
            _ => Err(ResourceError::NotFound),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn set_max_power(&mut self, max_power: i32) {
        self.max_power = max_power;
        self.max_current = sim::max_current_budget(max_power);
    }

    fn show(&mut self, effect: IndicatorEffect, hw: &mut impl IndicatorPort, sink: &mut impl EventSink) {
        let before = self.indicator.lit();
        let lit = self.indicator.apply(effect, hw);
        if lit != before {
            sink.emit(&AppEvent::Indicator(lit));
        }
    }

    fn notify(&self, sink: &mut impl EventSink) {
        match codec::encode(&self.snapshot()) {
            Ok(payload) => sink.emit(&AppEvent::Notify {
                resource: resources::POWER_OBS,
                payload,
            }),
            Err(e) => warn!("Meter: snapshot not published: {}", e),
        }
    }

    pub fn snapshot(&self) -> codec::SenmlPack {
        telemetry::meter_snapshot(&self.identity.full_name, self.frame.instant_power)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn frame(&self) -> &MeterFrame {
        &self.frame
    }

    pub fn state(&self) -> Option<MeterState> {
        self.state
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn max_power(&self) -> i32 {
        self.max_power
    }

    pub fn max_current(&self) -> f32 {
        self.max_current
    }

    pub fn loads(&self) -> u32 {
        self.loads
    }

    pub fn is_overloaded(&self) -> bool {
        self.policy.is_overloaded()
    }

    pub fn in_countdown(&self) -> bool {
        self.scheduler.armed() == Some(TimerKind::Countdown)
    }

    pub fn armed_timer(&self) -> Option<TimerKind> {
        self.scheduler.armed()
    }

    pub fn indicator(&self) -> &Indicator {
        &self.indicator
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }
}

impl<R: Rng> ResourceHandler for MeterService<R> {
    fn handle(&mut self, request: &Request) -> Response {
        self.route(request).unwrap_or_else(|e| {
            warn!("Meter: {} {} rejected: {}", request.method, request.path, e);
            resources::reject(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::indicator::LedMask;
    use crate::registration::DeviceType;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct NullLeds;
    impl IndicatorPort for NullLeds {
        fn set_leds(&mut self, _leds: LedMask) {}
    }

    #[derive(Default)]
    struct Events(Vec<AppEvent>);
    impl EventSink for Events {
        fn emit(&mut self, event: &AppEvent) {
            self.0.push(event.clone());
        }
    }

    fn meter() -> MeterService<StdRng> {
        let identity = DeviceIdentity {
            full_name: "urn:dev:mac:0000000000000001:".into(),
            alias: "smart_meter_1".into(),
            device_type: DeviceType::SmartPowerMeter,
        };
        MeterService::new(&DeviceConfig::default(), identity, StdRng::seed_from_u64(7))
    }

    #[test]
    fn disabled_meter_reads_zero() {
        let mut m = meter();
        let mut sink = Events::default();
        let put = Request::put_json("status", &serde_json::json!({"status": false})).unwrap();
        assert_eq!(m.handle(&put).code, ResponseCode::Changed);
        m.tick(&mut NullLeds, &mut sink);
        assert_eq!(m.state(), Some(MeterState::Disabled));
        assert_eq!(m.frame().instant_power, 0.0);
        assert_eq!(m.indicator().lit(), LedMask::YELLOW);
    }

    #[test]
    fn unknown_resource_is_not_found() {
        let mut m = meter();
        assert_eq!(m.handle(&Request::get("nope")).code, ResponseCode::NotFound);
        assert_eq!(
            m.handle(&Request::get("status")).code,
            ResponseCode::MethodNotAllowed
        );
    }

    #[test]
    fn max_power_recomputes_budget() {
        let mut m = meter();
        let put = Request::put_json("max_power", &serde_json::json!({"max_power": 3600})).unwrap();
        assert_eq!(m.handle(&put).code, ResponseCode::Changed);
        assert_eq!(m.max_power(), 3600);
        assert!((m.max_current() - 20.0).abs() < 1e-3);
    }
}
