//! Simulated sources for running off the Pi.
//!
//! [`HumiditySim`] stands in for the soil probes plus the air thermometer
//! next to them.  Each probe's humidity is pulled toward the scenario's
//! resting level and loses water to evaporation, faster when the air is
//! warm.  It jumps now and then, and climbs while the simulated relay has
//! the valve open.  The air temperature wanders slowly around the
//! scenario's mean.
//!
//! [`ManualSource`] replays whatever humidity and temperature were last
//! pushed through its [`ManualInput`], e.g. by the REST layer.

use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::watch;

use crate::adc;
use crate::relay::WateringFlag;
use crate::sensor::{Sample, SensorSource};

/// One draw from N(mean, sigma): Box–Muller on two uniforms.
pub fn gaussian(mean: f64, sigma: f64) -> f64 {
    // 1 - u is in (0, 1], so ln() stays finite.
    let u = 1.0 - fastrand::f64();
    let v = fastrand::f64();
    mean + sigma * (-2.0 * u.ln()).sqrt() * (TAU * v).cos()
}

/// Express a 0–100 value the way the MCP3008 would report it.
pub fn as_sample(value: f64) -> Sample {
    let value = value.clamp(0.0, 100.0);
    let raw = (value * 10.23).round().clamp(0.0, f64::from(adc::FULL_SCALE)) as i32;
    Sample { raw, value }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Garden conditions the simulator can play, selected by `SIM_SCENARIO`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scenario {
    /// Warm day, soil starts at 45 % and drops under the default threshold
    /// within a few minutes.
    #[default]
    Drying,
    /// Mild and steady around 50 %.
    Stable,
    /// Noisy probe with frequent spikes, for the smoothing window.
    Flaky,
    /// Cool and damp around 80 %; never asks for water.
    Wet,
}

/// Per-read rates are in percent.
#[derive(Debug, Clone, Copy)]
struct Profile {
    start: f64,
    rest: f64,
    pull: f64,
    evaporation: f64,
    walk: f64,
    noise: f64,
    spike_rate: f64,
    spike: f64,
    air_temp: f64,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [Self::Drying, Self::Stable, Self::Flaky, Self::Wet];

    pub fn name(self) -> &'static str {
        match self {
            Self::Drying => "drying",
            Self::Stable => "stable",
            Self::Flaky => "flaky",
            Self::Wet => "wet",
        }
    }

    fn profile(self) -> Profile {
        let base = Profile {
            start: 50.0,
            rest: 50.0,
            pull: 0.05,
            evaporation: 0.0,
            walk: 0.15,
            noise: 0.2,
            spike_rate: 0.005,
            spike: 6.0,
            air_temp: 20.0,
        };
        match self {
            Self::Drying => Profile {
                start: 45.0,
                rest: 20.0,
                pull: 0.002,
                evaporation: 0.12,
                walk: 0.3,
                noise: 0.5,
                spike_rate: 0.03,
                spike: 12.0,
                air_temp: 26.0,
            },
            Self::Stable => base,
            Self::Flaky => Profile {
                start: 45.0,
                rest: 45.0,
                pull: 0.02,
                evaporation: 0.04,
                walk: 0.6,
                noise: 2.0,
                spike_rate: 0.10,
                spike: 20.0,
                ..base
            },
            Self::Wet => Profile {
                start: 80.0,
                rest: 80.0,
                pull: 0.02,
                evaporation: 0.02,
                walk: 0.2,
                noise: 0.3,
                spike_rate: 0.02,
                spike: 8.0,
                air_temp: 14.0,
            },
        }
    }
}

impl FromStr for Scenario {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|sc| sc.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("unknown scenario {s:?}"))
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Humidity + temperature simulator
// ---------------------------------------------------------------------------

/// Humidity gained per read while the valve is open.
const WET_RATE: f64 = 2.5;
/// Evaporation rates in a [`Profile`] hold at this air temperature.
const REFERENCE_TEMP: f64 = 20.0;

pub struct HumiditySim {
    profile: Profile,
    /// "True" humidity per probe, before noise.
    levels: Vec<f64>,
    air_temp: f64,
    watering: WateringFlag,
}

impl HumiditySim {
    /// `watering` is the flag the simulated relay mirrors its state into.
    pub fn new(scenario: Scenario, probe_count: usize, watering: WateringFlag) -> Self {
        let profile = scenario.profile();
        let levels = (0..probe_count.max(1))
            .map(|_| (profile.start + gaussian(0.0, 2.0)).clamp(0.0, 100.0))
            .collect();
        Self {
            profile,
            levels,
            air_temp: profile.air_temp + gaussian(0.0, 0.5),
            watering,
        }
    }

    /// Next humidity reading in percent for probe `index` (wraps over the
    /// probe count).
    pub fn sample(&mut self, index: usize) -> f64 {
        let p = self.profile;
        let n = self.levels.len();
        let level = &mut self.levels[index % n];

        let evaporation = p.evaporation * (self.air_temp / REFERENCE_TEMP).max(0.0);
        let inflow = if self.watering.load(Ordering::Relaxed) {
            WET_RATE
        } else {
            0.0
        };
        *level = (*level + p.pull * (p.rest - *level) - evaporation
            + gaussian(0.0, p.walk)
            + inflow)
            .clamp(0.0, 100.0);

        let spike = if fastrand::f64() < p.spike_rate {
            gaussian(0.0, p.spike)
        } else {
            0.0
        };
        (*level + gaussian(0.0, p.noise) + spike).clamp(0.0, 100.0)
    }

    /// Next air temperature in °C.
    pub fn air_temperature(&mut self) -> f64 {
        self.air_temp += 0.05 * (self.profile.air_temp - self.air_temp) + gaussian(0.0, 0.1);
        self.air_temp
    }
}

impl SensorSource for HumiditySim {
    fn read(&mut self, channel: u8) -> anyhow::Result<Sample> {
        Ok(as_sample(self.sample(usize::from(channel))))
    }

    fn temperature(&mut self) -> anyhow::Result<Option<f64>> {
        Ok(Some(self.air_temperature()))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

// ---------------------------------------------------------------------------
// Manual input
// ---------------------------------------------------------------------------

/// Humidity a fresh manual source reports until something is pushed.
pub const MANUAL_INITIAL: f64 = 50.0;
/// Likewise for temperature, °C.
pub const MANUAL_TEMPERATURE: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManualReading {
    pub humidity: f64,
    pub temperature: f64,
}

/// Write side of a [`ManualSource`].
#[derive(Debug, Clone)]
pub struct ManualInput {
    tx: Arc<watch::Sender<ManualReading>>,
}

impl ManualInput {
    pub fn set(&self, humidity: f64) {
        self.tx.send_modify(|r| r.humidity = humidity);
    }

    pub fn set_temperature(&self, temperature: f64) {
        self.tx.send_modify(|r| r.temperature = temperature);
    }

    /// Current humidity.
    pub fn get(&self) -> f64 {
        self.tx.borrow().humidity
    }

    pub fn current(&self) -> ManualReading {
        *self.tx.borrow()
    }
}

/// Returns the latest pushed humidity on every channel.
pub struct ManualSource {
    rx: watch::Receiver<ManualReading>,
}

pub fn manual() -> (ManualInput, ManualSource) {
    let (tx, rx) = watch::channel(ManualReading {
        humidity: MANUAL_INITIAL,
        temperature: MANUAL_TEMPERATURE,
    });
    (ManualInput { tx: Arc::new(tx) }, ManualSource { rx })
}

impl SensorSource for ManualSource {
    fn read(&mut self, _channel: u8) -> anyhow::Result<Sample> {
        Ok(as_sample(self.rx.borrow().humidity))
    }

    fn temperature(&mut self) -> anyhow::Result<Option<f64>> {
        Ok(Some(self.rx.borrow().temperature))
    }

    fn name(&self) -> &'static str {
        "manual"
    }
}

// ===========================================================================
// Tests
// ===========================================================================
