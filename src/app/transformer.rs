//! Substation transformer control loop.
//!
//! [`TransformerService`] classifies every frame, runs the transformer
//! policy on the result and, when class 4 persists, pauses sensing to run
//! a disconnect session against the house meter.
//!
//! ```text
//!   ┌──────────┐ features ┌────────────┐ class ┌──────────────────┐
//!   │  frame   │─────────▶│ classifier │──────▶│ TransformerPolicy│
//!   └──────────┘          └────────────┘       └────────┬─────────┘
//!        ▲  sim::transformer::next(mode)                │ start_session
//!        └──────────────────────────────────────────────┤
//!                                                        ▼
//!                                        ┌───────────────────────────┐
//!                                        │ GridDisconnectCoordinator │
//!                                        └───────────────────────────┘
//! ```
//!
//! Sensing and the session share one scheduler slot, so they never
//! overlap.

use std::time::Duration;

use log::{info, warn};
use rand::Rng;

use crate::classifier::{self, FaultClass, FaultClassifier};
use crate::config::DeviceConfig;
use crate::coordinator::{GridDisconnectCoordinator, SessionProgress};
use crate::drivers::button::ButtonEvent;
use crate::drivers::indicator::{Indicator, IndicatorEffect};
use crate::error::ResourceError;
use crate::registration::{DeviceIdentity, RegistrationDocument};
use crate::rpc::codec;
use crate::rpc::resources::{self, ResourceHandler};
use crate::rpc::transport::{Link, Method, Request, Response, ResponseCode};
use crate::safety::transformer::{TransformerPolicy, TransformerState, mode_for};
use crate::scheduler::{Scheduler, TimerKind};
use crate::sim::transformer::{self as sim, BASELINE, TransformerFrame};
use crate::telemetry::{self, PublishRule, TelemetryPublisher};

use super::events::AppEvent;
use super::ports::{EventSink, IndicatorPort};

pub struct TransformerService<R: Rng, C: FaultClassifier> {
    identity: DeviceIdentity,
    rng: R,
    classifier: C,
    frame: TransformerFrame,
    /// Class of the last accepted classification.
    class: FaultClass,
    state: Option<TransformerState>,
    policy: TransformerPolicy,
    coordinator: GridDisconnectCoordinator,
    publisher: TelemetryPublisher,
    indicator: Indicator,
    scheduler: Scheduler,
    manual_fault: FaultClass,
    outbox: Vec<AppEvent>,
    sensing_period_ms: u64,
    countdown_step_ms: u64,
    tick_count: u64,
}

impl<R: Rng, C: FaultClassifier> TransformerService<R, C> {
    pub fn new(config: &DeviceConfig, identity: DeviceIdentity, rng: R, classifier: C) -> Self {
        let t = &config.transformer;
        Self {
            identity,
            rng,
            classifier,
            frame: BASELINE,
            class: FaultClass::Nominal,
            state: None,
            policy: TransformerPolicy::new(config.fault_threshold_ticks()),
            coordinator: GridDisconnectCoordinator::new(
                &t.house_peer,
                &t.house_status_path,
                t.max_attempts,
                config.countdown_ticks,
                Duration::from_millis(u64::from(config.link.request_timeout_ms)),
            ),
            publisher: TelemetryPublisher::new(PublishRule::EveryTick),
            indicator: Indicator::new(),
            scheduler: Scheduler::new(),
            manual_fault: FaultClass::Nominal,
            outbox: Vec::new(),
            sensing_period_ms: u64::from(config.sensing_period_ms),
            countdown_step_ms: u64::from(config.countdown_step_ms),
            tick_count: 0,
        }
    }

    pub fn registration_document(&self) -> RegistrationDocument {
        RegistrationDocument::new(&self.identity)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, now_ms: u64) {
        self.resume_sensing(now_ms);
    }

    /// Run whatever timer is due.  A session step may block on `link`.
    pub fn poll<L: Link + ?Sized>(
        &mut self,
        now_ms: u64,
        hw: &mut impl IndicatorPort,
        link: &mut L,
        sink: &mut impl EventSink,
    ) {
        self.flush(sink);
        match self.scheduler.poll(now_ms) {
            Some(TimerKind::Sensing) => self.tick(now_ms, hw, sink),
            Some(TimerKind::Session) => self.session_step(now_ms, hw, link, sink),
            Some(TimerKind::Countdown) | None => {}
        }
    }

    pub fn flush(&mut self, sink: &mut impl EventSink) {
        for event in self.outbox.drain(..) {
            sink.emit(&event);
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// One sensing cycle: classify → policy → simulate → indicator → publish.
    pub fn tick(&mut self, now_ms: u64, hw: &mut impl IndicatorPort, sink: &mut impl EventSink) {
        self.tick_count += 1;

        // 1. Classify the current readings
        let verdict = match classifier::classify(&self.classifier, &self.frame.features()) {
            Ok(class) => {
                self.class = class;
                Some(self.policy.evaluate(class, self.coordinator.is_active()))
            }
            Err(e) => {
                warn!("Transformer: classifier output rejected: {}", e);
                sink.emit(&AppEvent::ClassifierRejected(e));
                None
            }
        };

        // 2. Move the readings; a rejected tick keeps the last accepted mode
        let mode = verdict.map_or_else(|| mode_for(self.class), |v| v.mode);
        self.frame = sim::next(&mut self.rng, &self.frame, mode);

        // 3. Indicator
        if let Some(v) = verdict {
            self.show(v.state.effect(), hw, sink);
            if self.state != Some(v.state) {
                sink.emit(&AppEvent::TransformerStateChanged {
                    from: self.state,
                    to: v.state,
                    class: self.class,
                });
                self.state = Some(v.state);
            }
        }

        // 4. Publish (every tick, after the policy)
        if self.publisher.should_publish(self.class.index() as f32) {
            self.notify(sink);
        }

        // 5. Persistent class 4: pause sensing and negotiate with the house
        if verdict.is_some_and(|v| v.start_session) && self.coordinator.start() {
            match self
                .scheduler
                .switch_to(TimerKind::Session, now_ms, 0, self.countdown_step_ms)
            {
                Ok(_) => sink.emit(&AppEvent::SessionStarted),
                Err(e) => warn!("Transformer: cannot schedule session: {}", e),
            }
        }
    }

    /// One timer firing of the active disconnect session.
    pub fn session_step<L: Link + ?Sized>(
        &mut self,
        now_ms: u64,
        hw: &mut impl IndicatorPort,
        link: &mut L,
        sink: &mut impl EventSink,
    ) {
        match self.coordinator.step(link) {
            SessionProgress::CooldownStarted { ticks } => {
                self.frame = BASELINE;
                self.show(IndicatorEffect::AllOn, hw, sink);
                sink.emit(&AppEvent::SessionCooldown { remaining: ticks });
            }
            SessionProgress::CooldownTick { remaining } => {
                sink.emit(&AppEvent::SessionCooldown { remaining });
            }
            SessionProgress::Finished(outcome) => {
                self.show(IndicatorEffect::AllOff, hw, sink);
                self.resume_sensing(now_ms);
                sink.emit(&AppEvent::SessionFinished(outcome));
            }
            SessionProgress::Idle => self.resume_sensing(now_ms),
        }
    }

    // ── Manual fault injection ────────────────────────────────

    pub fn on_button(&mut self, event: ButtonEvent, now_ms: u64, sink: &mut impl EventSink) {
        if self.coordinator.is_active() {
            return;
        }
        match event {
            ButtonEvent::Held { .. } => {
                self.scheduler.stop();
                self.manual_fault = next_manual_fault(self.manual_fault);
                info!("Transformer: fault {} selected", self.manual_fault);
                sink.emit(&AppEvent::ManualFaultSelected(self.manual_fault));
            }
            ButtonEvent::Release { .. } => {
                self.frame = sim::fault_preset(self.manual_fault);
                info!("Transformer: fault {} injected", self.manual_fault);
                sink.emit(&AppEvent::ManualFaultInjected(self.manual_fault));
                self.resume_sensing(now_ms);
            }
            ButtonEvent::Press => {}
        }
    }

    // ── Resources ─────────────────────────────────────────────

    fn put_settings(&mut self, request: &Request) -> Result<Response, ResourceError> {
        let delta = resources::parse_settings(&request.payload)?;
        if delta.is_empty() {
            return Ok(Response::empty(ResponseCode::Changed));
        }
        let mut f = self.frame;
        for (value, add) in [
            (&mut f.ia, delta.ia),
            (&mut f.ib, delta.ib),
            (&mut f.ic, delta.ic),
            (&mut f.va, delta.va),
            (&mut f.vb, delta.vb),
            (&mut f.vc, delta.vc),
        ] {
            if let Some(add) = add {
                *value += add;
            }
        }
        if !f.features().iter().all(|v| v.is_finite()) {
            return Err(ResourceError::BadRequest("adjusted reading out of range"));
        }
        self.frame = f;
        info!("Transformer: settings adjusted to {:?}", self.frame);
        Ok(Response::empty(ResponseCode::Changed))
    }

    fn route(&mut self, request: &Request) -> Result<Response, ResourceError> {
        match (request.path.as_str(), request.method) {
            (resources::TRANSFORMER_STATE | resources::TRANSFORMER_STATE_OBS, Method::Get) => {
                Ok(Response::json(ResponseCode::Content, &self.snapshot()))
            }
            (resources::TRANSFORMER_SETTINGS, Method::Put) => self.put_settings(request),
            (
                resources::TRANSFORMER_STATE
                | resources::TRANSFORMER_STATE_OBS
                | resources::TRANSFORMER_SETTINGS,
                _,
            ) => Err(ResourceError::MethodNotAllowed),
            _ => Err(ResourceError::NotFound),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn resume_sensing(&mut self, now_ms: u64) {
        if let Err(e) = self.scheduler.switch_to(
            TimerKind::Sensing,
            now_ms,
            self.sensing_period_ms,
            self.sensing_period_ms,
        ) {
            warn!("Transformer: cannot resume sensing: {}", e);
        }
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
                resource: resources::TRANSFORMER_STATE_OBS,
                payload,
            }),
            Err(e) => warn!("Transformer: snapshot not published: {}", e),
        }
    }

    pub fn snapshot(&self) -> codec::SenmlPack {
        telemetry::transformer_snapshot(&self.identity.full_name, self.class, &self.frame)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn frame(&self) -> &TransformerFrame {
        &self.frame
    }

    pub fn class(&self) -> FaultClass {
        self.class
    }

    pub fn state(&self) -> Option<TransformerState> {
        self.state
    }

    pub fn critical_ticks(&self) -> u32 {
        self.policy.critical_ticks()
    }

    pub fn session_active(&self) -> bool {
        self.coordinator.is_active()
    }

    pub fn manual_fault(&self) -> FaultClass {
        self.manual_fault
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

impl<R: Rng, C: FaultClassifier> ResourceHandler for TransformerService<R, C> {
    fn handle(&mut self, request: &Request) -> Response {
        self.route(request).unwrap_or_else(|e| {
            warn!("Transformer: {} {} rejected: {}", request.method, request.path, e);
            resources::reject(e)
        })
    }
}

/// 1 → 2 → 3 → 4 → 1.  Class 0 is never selected.
fn next_manual_fault(current: FaultClass) -> FaultClass {
    match current {
        FaultClass::Nominal | FaultClass::Unrepairable => FaultClass::Minor,
        FaultClass::Minor => FaultClass::Major,
        FaultClass::Major => FaultClass::Severe,
        FaultClass::Severe => FaultClass::Unrepairable,
    }
}
