//! Mock adapters for integration tests.
//!
//! Records every indicator write, every emitted event and every outbound
//! request so tests can assert on the full history without sockets or
//! GPIOs.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::time::Duration;

use sparkgrid::app::events::AppEvent;
use sparkgrid::app::ports::{EventSink, IndicatorPort};
use sparkgrid::classifier::{CLASSES, FEATURES, FaultClass, FaultClassifier};
use sparkgrid::config::DeviceConfig;
use sparkgrid::coordinator::SessionOutcome;
use sparkgrid::drivers::indicator::LedMask;
use sparkgrid::error::LinkError;
use sparkgrid::registration::{DeviceIdentity, DeviceType};
use sparkgrid::rpc::codec;
use sparkgrid::rpc::transport::{Link, Request, Response, ResponseCode};

// ── MockIndicator ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockIndicator {
    pub writes: Vec<LedMask>,
}

impl MockIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lit(&self) -> LedMask {
        self.writes.last().copied().unwrap_or(LedMask::NONE)
    }
}

impl IndicatorPort for MockIndicator {
    fn set_leds(&mut self, leds: LedMask) {
        self.writes.push(leds);
    }
}

// ── LogSink ───────────────────────────────────────────────────

#[derive(Default)]
pub struct LogSink {
    pub events: Vec<AppEvent>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn notifications(&self) -> usize {
        self.count(|e| matches!(e, AppEvent::Notify { .. }))
    }

    pub fn sessions_started(&self) -> usize {
        self.count(|e| matches!(e, AppEvent::SessionStarted))
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.events.iter().rev().find_map(|e| match e {
            AppEvent::SessionFinished(o) => Some(*o),
            _ => None,
        })
    }

    /// JSON of the most recent notification.
    pub fn last_notification(&self) -> Option<serde_json::Value> {
        self.events.iter().rev().find_map(|e| match e {
            AppEvent::Notify { payload, .. } => codec::decode(payload).ok(),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── ScriptedLink ──────────────────────────────────────────────

/// Replies from a script, then times out.  Records every request.
#[derive(Default)]
pub struct ScriptedLink {
    pub replies: VecDeque<Result<Response, LinkError>>,
    pub requests: Vec<(String, Request)>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, code: ResponseCode, body: Option<serde_json::Value>) -> Self {
        let resp = match body {
            Some(b) => Response::json(code, &b),
            None => Response::empty(code),
        };
        self.replies.push_back(Ok(resp));
        self
    }

    pub fn fail(mut self, err: LinkError) -> Self {
        self.replies.push_back(Err(err));
        self
    }
}

impl Link for ScriptedLink {
    fn request(
        &mut self,
        peer: &str,
        request: &Request,
        _timeout: Duration,
    ) -> Result<Response, LinkError> {
        self.requests.push((peer.to_string(), request.clone()));
        self.replies.pop_front().unwrap_or(Err(LinkError::Timeout))
    }
}

// ── ScriptedClassifier ────────────────────────────────────────

/// Plays back a fixed class sequence, then repeats the last entry.
pub struct ScriptedClassifier {
    classes: Vec<FaultClass>,
    next: Cell<usize>,
}

impl ScriptedClassifier {
    pub fn new(classes: &[FaultClass]) -> Self {
        Self {
            classes: classes.to_vec(),
            next: Cell::new(0),
        }
    }
}

impl FaultClassifier for ScriptedClassifier {
    fn predict_proba(&self, _features: &[f32; FEATURES]) -> [f32; CLASSES] {
        let i = self.next.get().min(self.classes.len() - 1);
        self.next.set(self.next.get() + 1);
        let mut p = [0.0; CLASSES];
        p[self.classes[i].index()] = 1.0;
        p
    }
}

/// Always returns NaN probabilities.
pub struct BrokenClassifier;

impl FaultClassifier for BrokenClassifier {
    fn predict_proba(&self, _features: &[f32; FEATURES]) -> [f32; CLASSES] {
        [f32::NAN; CLASSES]
    }
}

// ── Fixtures ──────────────────────────────────────────────────

pub fn meter_identity() -> DeviceIdentity {
    DeviceIdentity {
        full_name: "urn:dev:mac:00124B0000000001:".into(),
        alias: "smart_meter_1".into(),
        device_type: DeviceType::SmartPowerMeter,
    }
}

pub fn transformer_identity() -> DeviceIdentity {
    DeviceIdentity {
        full_name: "urn:dev:mac:00124B0000000002:".into(),
        alias: "smart_transformer_1".into(),
        device_type: DeviceType::SmartTransformer,
    }
}

pub fn config() -> DeviceConfig {
    DeviceConfig::default()
}
