//! Boot-time registration: device → link → registry → defaults applied.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use sparkgrid::adapters::device_id;
use sparkgrid::adapters::loopback::LoopbackLink;
use sparkgrid::adapters::registry::LocalRegistry;
use sparkgrid::app::events::AppEvent;
use sparkgrid::app::meter::MeterService;
use sparkgrid::app::transformer::TransformerService;
use sparkgrid::classifier::ThresholdClassifier;
use sparkgrid::error::{LinkError, RegistrationError};
use sparkgrid::registration::{DeviceType, RegistrationClient};
use sparkgrid::rpc::codec;
use sparkgrid::rpc::transport::{Method, ResponseCode};

use crate::mock_hw::{LogSink, MockIndicator, ScriptedLink, config, meter_identity};

fn client() -> RegistrationClient {
    let link = config().link;
    RegistrationClient::new(
        &link.registry_peer,
        &link.registry_path,
        Duration::from_millis(10),
    )
}

#[test]
fn meter_retries_then_adopts_defaults() {
    let mut meter = MeterService::new(&config(), meter_identity(), StdRng::seed_from_u64(31));
    let mut link = ScriptedLink::new()
        .fail(LinkError::Timeout)
        .reply(ResponseCode::BadRequest, None)
        .reply(
            ResponseCode::Created,
            Some(serde_json::json!({"status": false, "max_power": 3600})),
        );

    let mut client = client();
    let record = client.register(&mut link, meter.identity(), &meter.registration_document());
    meter.apply_registration(&record);

    assert_eq!(client.attempts(), 3);
    assert_eq!(link.requests.len(), 3);
    let (peer, request) = &link.requests[0];
    assert_eq!(peer, "127.0.0.1:5690");
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.path, "registration");
    let doc: serde_json::Value = codec::decode(&request.payload).unwrap();
    assert_eq!(doc["type"], 1);
    assert_eq!(doc["status"], true);
    assert_eq!(doc["max_power"], 6000);

    assert!(!meter.is_activated());
    assert_eq!(meter.max_power(), 3600);
    assert!((meter.max_current() - 20.0).abs() < 1e-3);

    // The registration event is reported on the first poll.
    let (mut hw, mut sink) = (MockIndicator::new(), LogSink::new());
    meter.poll(0, &mut hw, &mut sink);
    assert_eq!(
        sink.events.first(),
        Some(&AppEvent::Registered {
            activated: Some(false),
            max_power: Some(3600),
        })
    );
}

#[test]
fn both_devices_register_with_local_registry() {
    let cfg = config();
    let registry = Rc::new(RefCell::new(
        LocalRegistry::new(&cfg.link.registry_path).with_max_power(4500),
    ));
    let mut link = LoopbackLink::new();
    link.attach(&cfg.link.registry_peer, registry.clone());

    let meter_id = device_id::identity(
        &[0x00, 0x12, 0x4b, 0x00, 0x00, 0x00, 0x00, 0x11],
        "smart_meter_1",
        DeviceType::SmartPowerMeter,
    );
    let mut meter = MeterService::new(&cfg, meter_id.clone(), StdRng::seed_from_u64(32));
    let record = client().register(&mut link, &meter_id, &meter.registration_document());
    meter.apply_registration(&record);
    assert!(meter.is_activated());
    assert_eq!(meter.max_power(), 4500);

    let tr_id = device_id::identity(
        &[0x00, 0x12, 0x4b, 0x00, 0x00, 0x00, 0x00, 0x22],
        "smart_transformer_1",
        DeviceType::SmartTransformer,
    );
    let transformer = TransformerService::new(
        &cfg,
        tr_id.clone(),
        StdRng::seed_from_u64(33),
        ThresholdClassifier,
    );
    let record = client().register(&mut link, &tr_id, &transformer.registration_document());
    assert_eq!(record.activated, None);
    assert_eq!(record.max_power, None);

    let registry = registry.borrow();
    let devices = registry.devices();
    assert_eq!(devices.len(), 2);
    assert_eq!(
        devices["urn:dev:mac:00124B0000000011:"].device_type,
        DeviceType::SmartPowerMeter
    );
    assert_eq!(devices["urn:dev:mac:00124B0000000022:"].alias, "smart_transformer_1");
}

#[test]
fn missing_registry_is_a_failed_attempt() {
    let mut link = LoopbackLink::new();
    let id = meter_identity();
    let meter = MeterService::new(&config(), id.clone(), StdRng::seed_from_u64(34));
    let mut client = client();
    let err = client
        .try_register(&mut link, &id, &meter.registration_document())
        .unwrap_err();
    assert_eq!(err, RegistrationError::Link(LinkError::UnknownPeer));
    assert_eq!(client.attempts(), 1);
}
