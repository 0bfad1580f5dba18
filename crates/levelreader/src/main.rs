mod config;
mod levels;
mod sim;
mod web;

use anyhow::Result;
use std::env;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rpi_control::sensor::{self, SensorSource};
use rpi_control::{shutdown, StatusBoard};

use levels::{LevelReader, Levels};
use sim::TankSim;

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
    info!(
        water_threshold = settings.water_threshold,
        oil_threshold = settings.oil_threshold,
        smooth_width = settings.smooth_width,
        "thresholds"
    );

    // ── ADC (or simulated tank) ─────────────────────────────────────
    let source: Box<dyn SensorSource> = if cfg.sensor.simulate {
        Box::new(TankSim::new(settings.channels))
    } else {
        match sensor::open_adc() {
            Ok(adc) => adc,
            Err(e) => {
                warn!("ADC unavailable ({e:#}), simulating the tank");
                Box::new(TankSim::new(settings.channels))
            }
        }
    };

    let board = StatusBoard::new(Levels::new(&settings));
    let (trigger, stop) = shutdown::channel();
    tokio::spawn(shutdown::fire_on_signal(trigger.clone()));

    let web_task = cfg.web.enabled.then(|| {
        let (port, levels, stop) = (cfg.http_port(), board.reader(), stop.clone());
        tokio::spawn(async move {
            if let Err(e) = web::serve(port, levels, stop).await {
                error!("web server error: {e:#}");
            }
        })
    });

    let result = LevelReader::new(source, &settings, board).run(stop).await;

    trigger.fire();
    if let Some(handle) = web_task {
        if tokio::time::timeout(GRACE, handle).await.is_err() {
            warn!("web server did not stop within {GRACE:?}");
        }
    }
    result
}
