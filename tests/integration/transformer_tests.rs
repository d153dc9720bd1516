//! Integration tests for the transformer: classification → policy →
//! disconnect session against a house meter.

use std::cell::RefCell;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

use sparkgrid::adapters::loopback::LoopbackLink;
use sparkgrid::app::events::AppEvent;
use sparkgrid::app::meter::MeterService;
use sparkgrid::app::transformer::TransformerService;
use sparkgrid::classifier::{FaultClass, FaultClassifier, ThresholdClassifier};
use sparkgrid::coordinator::{AbandonedAt, SessionOutcome};
use sparkgrid::drivers::button::ButtonEvent;
use sparkgrid::drivers::indicator::LedMask;
use sparkgrid::rpc::codec;
use sparkgrid::rpc::resources::{self, ResourceHandler, StatusBody};
use sparkgrid::rpc::transport::{Link, Request, ResponseCode};
use sparkgrid::safety::transformer::TransformerState;
use sparkgrid::scheduler::TimerKind;
use sparkgrid::sim::transformer::{BASELINE, fault_preset};

use crate::mock_hw::{
    BrokenClassifier, LogSink, MockIndicator, ScriptedClassifier, ScriptedLink, config,
    meter_identity, transformer_identity,
};

use FaultClass::{Nominal, Unrepairable};

const HOUSE: &str = "127.0.0.1:5683";

fn make_transformer<C: FaultClassifier>(classifier: C) -> TransformerService<StdRng, C> {
    TransformerService::new(
        &config(),
        transformer_identity(),
        StdRng::seed_from_u64(21),
        classifier,
    )
}

fn always_critical() -> ScriptedClassifier {
    ScriptedClassifier::new(&[Unrepairable])
}

/// Tick until a session starts.  Returns the number of ticks it took.
fn tick_until_session<C: FaultClassifier>(
    t: &mut TransformerService<StdRng, C>,
    hw: &mut MockIndicator,
    sink: &mut LogSink,
) -> usize {
    for n in 1..=50 {
        t.tick(0, hw, sink);
        if t.session_active() {
            return n;
        }
    }
    panic!("no session after 50 ticks");
}

/// Step the active session to its end.  Returns the number of steps.
fn run_session<C: FaultClassifier, L: Link>(
    t: &mut TransformerService<StdRng, C>,
    hw: &mut MockIndicator,
    link: &mut L,
    sink: &mut LogSink,
) -> usize {
    let mut steps = 0;
    while t.session_active() {
        t.session_step(0, hw, link, sink);
        steps += 1;
        assert!(steps <= 20, "session never finished");
    }
    steps
}

fn sent_statuses(link: &ScriptedLink) -> Vec<bool> {
    link.requests
        .iter()
        .map(|(_, r)| codec::decode::<StatusBody>(&r.payload).unwrap().status)
        .collect()
}

fn acked(previous: bool) -> Option<serde_json::Value> {
    Some(json!({"previous_status": previous}))
}

// ── Policy edge trigger ──────────────────────────────────────

#[test]
fn session_starts_on_sixth_consecutive_critical_tick() {
    let mut classes = vec![Nominal, Nominal];
    classes.extend([Unrepairable; 6]);
    let mut t = make_transformer(ScriptedClassifier::new(&classes));
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());

    for _ in 0..7 {
        t.tick(0, &mut hw, &mut sink);
    }
    assert_eq!(sink.sessions_started(), 0);
    assert_eq!(t.critical_ticks(), 5);
    assert_eq!(hw.lit(), LedMask::RED);

    t.tick(0, &mut hw, &mut sink);
    assert_eq!(sink.sessions_started(), 1);
    assert_eq!(t.critical_ticks(), 0);
    assert_eq!(t.armed_timer(), Some(TimerKind::Session));
}

#[test]
fn interrupted_run_does_not_trigger() {
    let mut classes = vec![Unrepairable; 5];
    classes.push(FaultClass::Severe);
    classes.extend([Unrepairable; 5]);
    classes.push(Nominal);
    let mut t = make_transformer(ScriptedClassifier::new(&classes));
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    for _ in 0..20 {
        t.tick(0, &mut hw, &mut sink);
    }
    assert_eq!(sink.sessions_started(), 0);
    assert_eq!(t.state(), Some(TransformerState::Ok));
}

#[test]
fn every_tick_publishes_seven_records() {
    let mut t = make_transformer(ThresholdClassifier);
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    for _ in 0..4 {
        t.tick(0, &mut hw, &mut sink);
    }
    assert_eq!(sink.notifications(), 4);
    let doc = sink.last_notification().unwrap();
    assert_eq!(doc["bn"], "urn:dev:mac:00124B0000000002:");
    let names: Vec<&str> = doc["e"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["n"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        ["state", "current_A", "current_B", "current_C", "voltage_A", "voltage_B", "voltage_C"]
    );
    assert_eq!(doc["e"][0]["v"], 0);
}

#[test]
fn rejected_classification_still_publishes() {
    let mut t = make_transformer(BrokenClassifier);
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    t.tick(0, &mut hw, &mut sink);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ClassifierRejected(_))), 1);
    assert_eq!(sink.notifications(), 1);
    assert_eq!(t.state(), None);
    assert!(hw.writes.is_empty());
    assert_eq!(t.class(), Nominal);
}

// ── Disconnect sessions (scripted house) ─────────────────────

#[test]
fn active_house_is_disconnected_then_restored() {
    let mut t = make_transformer(always_critical());
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    let mut link = ScriptedLink::new()
        .reply(ResponseCode::Changed, acked(true))
        .reply(ResponseCode::Changed, acked(false));

    tick_until_session(&mut t, &mut hw, &mut sink);
    let steps = run_session(&mut t, &mut hw, &mut link, &mut sink);

    // disconnect, 4 cooldown ticks, then the reconnect step
    assert_eq!(steps, 6);
    assert_eq!(sent_statuses(&link), [false, true]);
    assert!(link.requests.iter().all(|(peer, r)| peer == HOUSE && r.path == resources::STATUS));
    assert_eq!(sink.outcome(), Some(SessionOutcome::Restored));
    let cooldown: Vec<u8> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::SessionCooldown { remaining } => Some(*remaining),
            _ => None,
        })
        .collect();
    assert_eq!(cooldown, [5, 4, 3, 2, 1]);
    assert_eq!(*t.frame(), BASELINE);
    assert_eq!(hw.lit(), LedMask::NONE);
    assert_eq!(t.armed_timer(), Some(TimerKind::Sensing));
}

#[test]
fn inactive_house_is_left_disconnected() {
    let mut t = make_transformer(always_critical());
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    let mut link = ScriptedLink::new().reply(ResponseCode::Changed, acked(false));

    tick_until_session(&mut t, &mut hw, &mut sink);
    run_session(&mut t, &mut hw, &mut link, &mut sink);

    assert_eq!(sent_statuses(&link), [false]);
    assert_eq!(sink.outcome(), Some(SessionOutcome::LeftDisconnected));
}

#[test]
fn unreachable_house_abandons_and_retriggers() {
    let mut t = make_transformer(always_critical());
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    let mut link = ScriptedLink::new();

    tick_until_session(&mut t, &mut hw, &mut sink);
    let steps = run_session(&mut t, &mut hw, &mut link, &mut sink);
    assert_eq!(steps, 1);
    assert_eq!(link.requests.len(), 3);
    assert_eq!(
        sink.outcome(),
        Some(SessionOutcome::Abandoned(AbandonedAt::Disconnect))
    );
    assert_eq!(t.armed_timer(), Some(TimerKind::Sensing));

    // Fail open: the fault persists, so a fresh run starts a new session.
    assert_eq!(tick_until_session(&mut t, &mut hw, &mut sink), 6);
    assert_eq!(sink.sessions_started(), 2);
}

#[test]
fn bad_replies_count_as_failed_attempts() {
    let mut t = make_transformer(always_critical());
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    let mut link = ScriptedLink::new()
        .reply(ResponseCode::BadRequest, None)
        .reply(ResponseCode::Changed, Some(json!({"previous_status": "yes"})))
        .reply(ResponseCode::Changed, acked(true))
        .reply(ResponseCode::Changed, acked(false));

    tick_until_session(&mut t, &mut hw, &mut sink);
    run_session(&mut t, &mut hw, &mut link, &mut sink);
    assert_eq!(sent_statuses(&link), [false, false, false, true]);
    assert_eq!(sink.outcome(), Some(SessionOutcome::Restored));
}

#[test]
fn exhausted_reconnect_is_abandoned() {
    let mut t = make_transformer(always_critical());
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    let mut link = ScriptedLink::new().reply(ResponseCode::Changed, acked(true));

    tick_until_session(&mut t, &mut hw, &mut sink);
    run_session(&mut t, &mut hw, &mut link, &mut sink);
    assert_eq!(sent_statuses(&link), [false, true, true, true]);
    assert_eq!(
        sink.outcome(),
        Some(SessionOutcome::Abandoned(AbandonedAt::Reconnect))
    );
}

#[test]
fn buttons_are_ignored_during_a_session() {
    let mut t = make_transformer(always_critical());
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    tick_until_session(&mut t, &mut hw, &mut sink);

    t.on_button(ButtonEvent::Held { secs: 1 }, 0, &mut sink);
    t.on_button(ButtonEvent::Release { held_secs: 1 }, 0, &mut sink);
    assert_eq!(t.manual_fault(), Nominal);
    assert_eq!(t.armed_timer(), Some(TimerKind::Session));
}

// ── Against a real meter over the loopback link ──────────────

#[test]
fn session_switches_real_meter_off_and_back_on() {
    let meter = Rc::new(RefCell::new(MeterService::new(
        &config(),
        meter_identity(),
        StdRng::seed_from_u64(22),
    )));
    let mut link = LoopbackLink::new();
    link.attach(HOUSE, meter.clone());

    let mut t = make_transformer(always_critical());
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    t.start(0);

    let mut house_was_off = false;
    let mut now = 0;
    while sink.outcome().is_none() {
        now += 500;
        assert!(now <= 60_000, "no outcome by {now} ms");
        t.poll(now, &mut hw, &mut link, &mut sink);
        if t.session_active() && !meter.borrow().is_activated() {
            house_was_off = true;
        }
    }

    assert!(house_was_off);
    assert!(meter.borrow().is_activated());
    assert_eq!(sink.outcome(), Some(SessionOutcome::Restored));
    // Six sensing ticks (2 s apart), the disconnect on the next poll,
    // then five more session steps one second apart.
    assert_eq!(t.tick_count(), 6);
    assert_eq!(now, 17_000);
}

#[test]
fn meter_already_off_stays_off() {
    let meter = Rc::new(RefCell::new(MeterService::new(
        &config(),
        meter_identity(),
        StdRng::seed_from_u64(23),
    )));
    let off = Request::put_json(resources::STATUS, &json!({"status": false})).unwrap();
    assert_eq!(meter.borrow_mut().handle(&off).code, ResponseCode::Changed);

    let mut link = LoopbackLink::new();
    link.attach(HOUSE, meter.clone());
    let mut t = make_transformer(always_critical());
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());

    tick_until_session(&mut t, &mut hw, &mut sink);
    run_session(&mut t, &mut hw, &mut link, &mut sink);
    assert_eq!(sink.outcome(), Some(SessionOutcome::LeftDisconnected));
    assert!(!meter.borrow().is_activated());
}

// ── Manual fault injection ───────────────────────────────────

#[test]
fn held_button_selects_and_release_injects() {
    let mut t = make_transformer(ThresholdClassifier);
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    t.start(0);

    for secs in 1..=4 {
        t.on_button(ButtonEvent::Held { secs }, 0, &mut sink);
        assert_eq!(t.armed_timer(), None, "sensing paused while selecting");
    }
    assert_eq!(t.manual_fault(), Unrepairable);

    t.on_button(ButtonEvent::Release { held_secs: 4 }, 1_000, &mut sink);
    assert_eq!(*t.frame(), fault_preset(Unrepairable));
    assert_eq!(t.armed_timer(), Some(TimerKind::Sensing));
    assert_eq!(
        sink.events.last(),
        Some(&AppEvent::ManualFaultInjected(Unrepairable))
    );

    // The injected readings classify as unrepairable on the next tick.
    let mut link = ScriptedLink::new();
    t.poll(3_000, &mut hw, &mut link, &mut sink);
    assert_eq!(t.class(), Unrepairable);
    assert_eq!(t.state(), Some(TransformerState::Critical));
}

#[test]
fn get_state_and_reject_unknown() {
    let mut t = make_transformer(ThresholdClassifier);
    let resp = t.handle(&Request::get(resources::TRANSFORMER_STATE));
    assert_eq!(resp.code, ResponseCode::Content);
    assert_eq!(
        t.handle(&Request::get(resources::POWER)).code,
        ResponseCode::NotFound
    );
    let put = Request::put_json(resources::TRANSFORMER_STATE, &json!({})).unwrap();
    assert_eq!(t.handle(&put).code, ResponseCode::MethodNotAllowed);
}
