//! Integration tests for the meter control loop: button → loads →
//! simulation → policy → indicator → notifications.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

use sparkgrid::app::events::AppEvent;
use sparkgrid::app::meter::MeterService;
use sparkgrid::drivers::button::ButtonEvent;
use sparkgrid::drivers::indicator::LedMask;
use sparkgrid::rpc::resources::ResourceHandler;
use sparkgrid::rpc::transport::{Request, ResponseCode};
use sparkgrid::safety::meter::MeterState;
use sparkgrid::scheduler::TimerKind;

use crate::mock_hw::{LogSink, MockIndicator, config, meter_identity};

fn make_meter(seed: u64) -> (MeterService<StdRng>, MockIndicator, LogSink) {
    let meter = MeterService::new(&config(), meter_identity(), StdRng::seed_from_u64(seed));
    (meter, MockIndicator::new(), LogSink::new())
}

/// Press until `loads` are on, then tick until the meter overloads.
fn drive_to_overload(
    meter: &mut MeterService<StdRng>,
    hw: &mut MockIndicator,
    sink: &mut LogSink,
) -> usize {
    for _ in 0..15 {
        meter.on_button(ButtonEvent::Press, 0, sink);
    }
    for tick in 1..=60 {
        meter.tick(hw, sink);
        if meter.state() == Some(MeterState::Overload) {
            return tick;
        }
    }
    panic!("meter never overloaded: {:?}", meter.frame());
}

// ── Policy + indicator ───────────────────────────────────────

#[test]
fn idle_house_exports_with_green_led() {
    let (mut meter, mut hw, mut sink) = make_meter(1);
    meter.tick(&mut hw, &mut sink);
    assert_eq!(meter.state(), Some(MeterState::Exporting));
    assert_eq!(hw.lit(), LedMask::GREEN);
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AppEvent::MeterStateChanged {
            from: None,
            to: MeterState::Exporting,
            ..
        }
    )));
}

#[test]
fn overload_latches_and_blacks_out() {
    let (mut meter, mut hw, mut sink) = make_meter(2);
    drive_to_overload(&mut meter, &mut hw, &mut sink);

    // The overload reading was above the budget, then the house went dark.
    let tripped_at = sink.events.iter().find_map(|e| match e {
        AppEvent::MeterStateChanged {
            to: MeterState::Overload,
            power_w,
            ..
        } => Some(*power_w),
        _ => None,
    });
    assert!(tripped_at.unwrap() > 6000.0);
    assert_eq!(meter.frame().instant_power, 0.0);
    assert_eq!(hw.lit(), LedMask::RED);

    // Latched: blackout frames, and presses add nothing.
    let loads = meter.loads();
    meter.on_button(ButtonEvent::Press, 0, &mut sink);
    assert_eq!(meter.loads(), loads);
    for _ in 0..5 {
        meter.tick(&mut hw, &mut sink);
        assert_eq!(meter.state(), Some(MeterState::Overload));
        assert_eq!(meter.frame().current_consumed, 0.0);
    }
}

#[test]
fn disabled_meter_reads_zero_and_shows_yellow() {
    let (mut meter, mut hw, mut sink) = make_meter(3);
    let put = Request::put_json("status", &json!({"status": false})).unwrap();
    let resp = meter.handle(&put);
    assert_eq!(resp.code, ResponseCode::Changed);
    let body: serde_json::Value = resp.decode().unwrap();
    assert_eq!(body, json!({"previous_status": true}));

    for _ in 0..3 {
        meter.tick(&mut hw, &mut sink);
        assert_eq!(meter.frame().instant_power, 0.0);
    }
    assert_eq!(meter.state(), Some(MeterState::Disabled));
    assert_eq!(hw.lit(), LedMask::YELLOW);

    // A disabled house ignores the button.
    meter.on_button(ButtonEvent::Press, 0, &mut sink);
    assert_eq!(meter.loads(), 0);
}

#[test]
fn malformed_put_changes_nothing() {
    let (mut meter, _, _) = make_meter(4);
    for body in [json!({}), json!({"status": "off"}), json!({"status": 0})] {
        let put = Request::put_json("status", &body).unwrap();
        assert_eq!(meter.handle(&put).code, ResponseCode::BadRequest, "{body:?}");
    }
    for body in [json!({"max_power": "lots"}), json!({"max_power": -5}), json!({"max_power": 0})] {
        let put = Request::put_json("max_power", &body).unwrap();
        assert_eq!(meter.handle(&put).code, ResponseCode::BadRequest, "{body:?}");
    }
    assert!(meter.is_activated());
    assert_eq!(meter.max_power(), 6000);
}

// ── Telemetry ────────────────────────────────────────────────

#[test]
fn quiet_house_publishes_on_first_tick_and_after_silence() {
    let (mut meter, mut hw, mut sink) = make_meter(5);
    for _ in 0..31 {
        meter.tick(&mut hw, &mut sink);
    }
    // Export swings stay well under the 1000 W delta.
    assert_eq!(sink.notifications(), 2);
}

#[test]
fn get_power_returns_senml() {
    let (mut meter, mut hw, mut sink) = make_meter(6);
    meter.tick(&mut hw, &mut sink);
    let resp = meter.handle(&Request::get("power"));
    assert_eq!(resp.code, ResponseCode::Content);
    let doc: serde_json::Value = resp.decode().unwrap();
    assert_eq!(doc["bn"], "urn:dev:mac:00124B0000000001:");
    assert_eq!(doc["bu"], "W");
    assert_eq!(doc["e"][0]["n"], "power");
}

// ── Long-press reset ─────────────────────────────────────────

#[test]
fn long_press_resets_after_countdown() {
    let (mut meter, mut hw, mut sink) = make_meter(7);
    meter.start(0);
    drive_to_overload(&mut meter, &mut hw, &mut sink);
    assert!(meter.is_overloaded());

    // Five seconds is not enough.
    meter.on_button(ButtonEvent::Held { secs: 5 }, 10_000, &mut sink);
    assert!(!meter.in_countdown());

    meter.on_button(ButtonEvent::Held { secs: 6 }, 10_000, &mut sink);
    assert!(meter.in_countdown());
    assert_eq!(meter.loads(), 0);

    // Further hold reports during the countdown are ignored.
    meter.on_button(ButtonEvent::Held { secs: 7 }, 10_500, &mut sink);

    for step in 1..=4u64 {
        meter.poll(10_000 + step * 1000, &mut hw, &mut sink);
        assert!(meter.in_countdown(), "still counting at step {step}");
    }
    meter.poll(15_000, &mut hw, &mut sink);
    assert!(!meter.in_countdown());
    assert_eq!(meter.armed_timer(), Some(TimerKind::Sensing));
    assert!(!meter.is_overloaded());
    assert_eq!(hw.lit(), LedMask::ALL);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ResetCountdownFinished)), 1);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ResetCountdownStarted)), 1);

    // Sensing resumes one period later and the house exports again.
    let before = meter.tick_count();
    meter.poll(17_000, &mut hw, &mut sink);
    assert_eq!(meter.tick_count(), before + 1);
    assert_eq!(meter.state(), Some(MeterState::Exporting));
}

#[test]
fn sensing_fires_once_per_period() {
    let (mut meter, mut hw, mut sink) = make_meter(8);
    meter.start(0);
    meter.poll(1_999, &mut hw, &mut sink);
    assert_eq!(meter.tick_count(), 0);
    meter.poll(2_000, &mut hw, &mut sink);
    meter.poll(2_001, &mut hw, &mut sink);
    assert_eq!(meter.tick_count(), 1);
    meter.poll(4_000, &mut hw, &mut sink);
    assert_eq!(meter.tick_count(), 2);
}

#[test]
fn resource_events_flush_on_next_poll() {
    let (mut meter, mut hw, mut sink) = make_meter(9);
    let put = Request::put_json("max_power", &json!({"max_power": 4500})).unwrap();
    assert_eq!(meter.handle(&put).code, ResponseCode::Changed);
    assert!(sink.events.is_empty());
    meter.poll(0, &mut hw, &mut sink);
    assert_eq!(
        sink.events.first(),
        Some(&AppEvent::MaxPowerChanged { max_power: 4500 })
    );
}
