//! SparkGrid host runtime.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  ConsoleIndicator  LogEventSink   JsonConfigFile  MonotonicClock│
//! │  (IndicatorPort)   (EventSink)    (ConfigPort)                 │
//! │  UdpLink / UdpResourceServer      LoopbackLink + LocalRegistry │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │   MeterService · TransformerService (pure logic)       │    │
//! │  │   policy · telemetry · disconnect coordinator          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `sparkgrid meter|transformer|sim [config.json]`.  Button input
//! comes from stdin: `down`, `up`, `click`, `quit`.  Closing stdin leaves
//! the device running.

#![deny(unused_must_use)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use sparkgrid::adapters::config_file::JsonConfigFile;
use sparkgrid::adapters::device_id;
use sparkgrid::adapters::indicator::ConsoleIndicator;
use sparkgrid::adapters::log_sink::{LogEventSink, Tee};
use sparkgrid::adapters::loopback::LoopbackLink;
use sparkgrid::adapters::registry::LocalRegistry;
use sparkgrid::adapters::time::MonotonicClock;
use sparkgrid::adapters::udp_link::{UdpLink, UdpResourceServer};
use sparkgrid::app::meter::MeterService;
use sparkgrid::app::ports::ConfigPort;
use sparkgrid::app::transformer::TransformerService;
use sparkgrid::classifier::ThresholdClassifier;
use sparkgrid::config::DeviceConfig;
use sparkgrid::drivers::button::{ButtonDriver, ButtonEvent};
use sparkgrid::events::{self, InputEvent, InputProducer, InputQueue};
use sparkgrid::registration::{DeviceIdentity, DeviceType, RegistrationClient};

/// Main loop poll interval.
const LOOP_MS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Meter,
    Transformer,
    Sim,
}

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════╗");
    info!("║  SparkGrid v{}                    ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Arguments + config ─────────────────────────────────
    let mut args = std::env::args().skip(1);
    let mode = match args.next().as_deref() {
        Some("meter") => Mode::Meter,
        Some("transformer") => Mode::Transformer,
        Some("sim") => Mode::Sim,
        other => bail!("usage: sparkgrid meter|transformer|sim [config.json] (got {other:?})"),
    };
    let config = match args.next() {
        Some(path) => JsonConfigFile::new(&path)
            .load()
            .with_context(|| format!("loading {path}"))?,
        None => DeviceConfig::default(),
    };
    config.validate().context("invalid configuration")?;

    // ── 3. Console input ──────────────────────────────────────
    let queue: &'static mut InputQueue = Box::leak(Box::new(InputQueue::new()));
    let (producer, mut consumer) = queue.split();
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || read_console(producer))
        .context("spawning console reader")?;

    let clock = MonotonicClock::new();
    let mut button = ButtonDriver::new();
    let mut level = false;
    let mut input = |now_ms: u64| -> Option<Option<ButtonEvent>> {
        let mut quit = false;
        events::drain_inputs(&mut consumer, |e| match e {
            InputEvent::ButtonLevel(l) => level = l,
            InputEvent::Shutdown => quit = true,
        });
        if quit {
            return None;
        }
        Some(button.tick(now_ms, level))
    };

    // ── 4. Run ────────────────────────────────────────────────
    match mode {
        Mode::Meter => run_meter(&config, &clock, &mut input),
        Mode::Transformer => run_transformer(&config, &clock, &mut input),
        Mode::Sim => run_sim(&config, &clock, &mut input),
    }
}

/// Polled once per loop: `None` on shutdown, otherwise the next gesture.
type ButtonInput<'a> = dyn FnMut(u64) -> Option<Option<ButtonEvent>> + 'a;

fn rng_for(config: &DeviceConfig) -> StdRng {
    match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn identity_for(config: &DeviceConfig, device_type: DeviceType, fallback: &str) -> DeviceIdentity {
    let alias = config.alias_or(fallback);
    let addr = config
        .link_address
        .unwrap_or_else(|| device_id::host_address(alias, device_type));
    let identity = device_id::identity(&addr, alias, device_type);
    info!("Device: {} ({})", identity.full_name, identity.alias);
    identity
}

fn registration_client(config: &DeviceConfig) -> RegistrationClient {
    RegistrationClient::new(
        &config.link.registry_peer,
        &config.link.registry_path,
        Duration::from_millis(u64::from(config.link.request_timeout_ms)),
    )
}

// ── Single device over UDP ────────────────────────────────────

fn run_meter(config: &DeviceConfig, clock: &MonotonicClock, input: &mut ButtonInput<'_>) -> Result<()> {
    let identity = identity_for(config, DeviceType::SmartPowerMeter, "smart_meter_1");
    let mut meter = MeterService::new(config, identity.clone(), rng_for(config));
    let mut server = UdpResourceServer::bind(&config.link.bind)
        .with_context(|| format!("binding {}", config.link.bind))?;
    let mut link = UdpLink::bind(bind_ip(&config.link.bind)).context("binding client socket")?;
    let mut leds = ConsoleIndicator::new("meter");

    let record = registration_client(config).register(&mut link, &identity, &meter.registration_document());
    meter.apply_registration(&record);
    meter.start(clock.now_ms());
    info!("Meter ready. Entering event loop.");

    loop {
        let now = clock.now_ms();
        let Some(gesture) = input(now) else { break };
        server.poll(&mut meter);
        let mut sink = Tee(LogEventSink::new("meter"), &mut server);
        if let Some(g) = gesture {
            meter.on_button(g, now, &mut sink);
        }
        meter.poll(now, &mut leds, &mut sink);
        std::thread::sleep(Duration::from_millis(LOOP_MS));
    }
    info!("Meter: shutting down");
    Ok(())
}

fn run_transformer(
    config: &DeviceConfig,
    clock: &MonotonicClock,
    input: &mut ButtonInput<'_>,
) -> Result<()> {
    let identity = identity_for(config, DeviceType::SmartTransformer, "smart_transformer_1");
    let mut transformer =
        TransformerService::new(config, identity.clone(), rng_for(config), ThresholdClassifier);
    let mut server = UdpResourceServer::bind(&config.link.bind)
        .with_context(|| format!("binding {}", config.link.bind))?;
    let mut link = UdpLink::bind(bind_ip(&config.link.bind)).context("binding client socket")?;
    let mut leds = ConsoleIndicator::new("transformer");

    registration_client(config).register(&mut link, &identity, &transformer.registration_document());
    transformer.start(clock.now_ms());
    info!("Transformer ready. Entering event loop.");

    loop {
        let now = clock.now_ms();
        let Some(gesture) = input(now) else { break };
        server.poll(&mut transformer);
        let mut sink = Tee(LogEventSink::new("transformer"), &mut server);
        if let Some(g) = gesture {
            transformer.on_button(g, now, &mut sink);
        }
        transformer.poll(now, &mut leds, &mut link, &mut sink);
        std::thread::sleep(Duration::from_millis(LOOP_MS));
    }
    info!("Transformer: shutting down");
    Ok(())
}

fn bind_ip(bind: &str) -> &str {
    bind.rsplit_once(':').map_or(bind, |(ip, _)| ip)
}

// ── Both devices in one process ───────────────────────────────

/// Meter, transformer and registry on a loopback link.  Console button
/// input goes to the transformer, which is the side with a manual path
/// into the interesting behaviour.
fn run_sim(config: &DeviceConfig, clock: &MonotonicClock, input: &mut ButtonInput<'_>) -> Result<()> {
    let mut link = LoopbackLink::new();
    let registry = Rc::new(RefCell::new(LocalRegistry::new(&config.link.registry_path)));
    link.attach(&config.link.registry_peer, registry.clone());

    let meter_id = identity_for(config, DeviceType::SmartPowerMeter, "smart_meter_1");
    let mut rng = rng_for(config);
    let meter_rng = StdRng::from_rng(&mut rng).context("seeding meter")?;
    let meter = Rc::new(RefCell::new(MeterService::new(config, meter_id.clone(), meter_rng)));

    let tr_id = identity_for(config, DeviceType::SmartTransformer, "smart_transformer_1");
    let mut transformer = TransformerService::new(config, tr_id.clone(), rng, ThresholdClassifier);

    let mut client = registration_client(config);
    let doc = meter.borrow().registration_document();
    let record = client.register(&mut link, &meter_id, &doc);
    meter.borrow_mut().apply_registration(&record);
    registration_client(config).register(&mut link, &tr_id, &transformer.registration_document());
    info!("Registry: {} device(s) registered", registry.borrow().devices().len());

    link.attach(&config.transformer.house_peer, meter.clone());

    let mut meter_leds = ConsoleIndicator::new("meter");
    let mut tr_leds = ConsoleIndicator::new("transformer");
    let mut meter_sink = LogEventSink::new("meter");
    let mut tr_sink = LogEventSink::new("transformer");

    let now = clock.now_ms();
    meter.borrow_mut().start(now);
    transformer.start(now);
    info!("Sim ready. Console button drives the transformer.");

    loop {
        let now = clock.now_ms();
        let Some(gesture) = input(now) else { break };
        if let Some(g) = gesture {
            transformer.on_button(g, now, &mut tr_sink);
        }
        meter.borrow_mut().poll(now, &mut meter_leds, &mut meter_sink);
        transformer.poll(now, &mut tr_leds, &mut link, &mut tr_sink);
        std::thread::sleep(Duration::from_millis(LOOP_MS));
    }
    info!("Sim: shutting down");
    Ok(())
}

// ── Console reader ────────────────────────────────────────────

fn read_console(mut producer: InputProducer<'static>) {
    events::feed_console(std::io::stdin().lock(), &mut producer);
}
