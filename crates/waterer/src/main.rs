mod config;
mod control;
mod state;
mod web;

use anyhow::Result;
use std::env;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rpi_control::relay::{self, SimulatedRelay, WateringFlag};
use rpi_control::sensor::{self, SensorSource};
use rpi_control::sim::{self, HumiditySim, ManualInput, Scenario};
use rpi_control::{shutdown, Actuator, StatusBoard};

use control::Controller;
use state::Snapshot;

/// How long in-flight tasks get to wind down after the loop has stopped.
const GRACE: Duration = Duration::from_millis(1500);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let explicit = env::var("CONFIG_PATH").ok();
    let path = explicit.as_deref().unwrap_or(config::DEFAULT_PATH);
    let mut warnings = Vec::new();
    let mut cfg = config::load(path, explicit.is_some(), &mut warnings);
    config::apply_env(&mut cfg, |k| env::var(k).ok(), &mut warnings);
    warnings.extend(cfg.sanitize());
    for w in &warnings {
        warn!("config: {w}");
    }
    let settings = cfg.settings();

    // ── Hardware (or stand-ins) ─────────────────────────────────────
    let watering = WateringFlag::default();
    let (source, manual) = open_source(&cfg, &watering);
    let actuator = open_relay(&cfg, &watering);
    info!(
        source = source.name(),
        relay_pin = cfg.relay_pin(),
        active_low = cfg.relay.active_low,
        "hardware ready"
    );

    // ── Shared status + shutdown ────────────────────────────────────
    let board = StatusBoard::new(Snapshot::new(&settings, source.name()));
    let (trigger, stop) = shutdown::channel();
    tokio::spawn(shutdown::fire_on_signal(trigger.clone()));

    // ── Web UI (optional) ───────────────────────────────────────────
    let web_task = if cfg.web.enabled {
        let state = web::AppState {
            status: board.reader(),
            manual,
            started_at: Instant::now(),
        };
        let port = cfg.http_port();
        let stop = stop.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = web::serve(port, state, stop).await {
                error!("web server error: {e:#}");
            }
        }))
    } else {
        None
    };

    // ── Control loop ────────────────────────────────────────────────
    info!("Watching the probe...");
    let result = Controller::new(source, actuator, settings, board).run(stop).await;

    // The loop only returns on shutdown or a fatal error; either way the
    // rest of the process winds down now.
    trigger.fire();
    if let Some(handle) = web_task {
        if tokio::time::timeout(GRACE, handle).await.is_err() {
            warn!("web server did not stop within {GRACE:?}");
        }
    }

    match &result {
        Ok(()) => info!("bye"),
        Err(e) => error!("exiting after fatal error: {e:#}"),
    }
    result
}

fn open_source(
    cfg: &config::Config,
    watering: &WateringFlag,
) -> (Box<dyn SensorSource>, Option<ManualInput>) {
    if !cfg.sensor.simulate {
        match sensor::open_adc() {
            Ok(adc) => return (adc, None),
            Err(e) => warn!("ADC unavailable ({e:#}), falling back to simulator"),
        }
    }

    if cfg.sensor.scenario == config::MANUAL {
        let (input, source) = sim::manual();
        if !cfg.web.enabled {
            warn!(
                "manual probe without the REST server, humidity stays at {} and temperature at {}",
                sim::MANUAL_INITIAL,
                sim::MANUAL_TEMPERATURE
            );
        }
        (Box::new(source), Some(input))
    } else {
        let scenario = cfg.sensor.scenario.parse::<Scenario>().unwrap_or_default();
        info!(%scenario, "simulated probe");
        let probes = usize::from(rpi_control::adc::MAX_CHANNEL) + 1;
        (
            Box::new(HumiditySim::new(scenario, probes, watering.clone())),
            None,
        )
    }
}

/// The relay is real whenever the pin can be claimed, even with a simulated
/// probe.  Only the simulated relay feeds back into the humidity simulator.
fn open_relay(cfg: &config::Config, watering: &WateringFlag) -> Box<dyn Actuator> {
    match relay::open_gpio(cfg.relay_pin(), cfg.relay.active_low) {
        Ok(r) => r,
        Err(e) => {
            warn!("GPIO unavailable ({e:#}), using simulated relay");
            Box::new(SimulatedRelay::with_watering_flag(watering.clone()))
        }
    }
}
