//! Level reader configuration: defaults, optional TOML file, environment
//! overrides, then a sanitising pass.

use rpi_control::config::{self as layered, override_bool, override_parsed};
use serde::Deserialize;
use std::time::Duration;

use crate::levels::Settings;

pub const DEFAULT_PATH: &str = "levelreader.toml";

const WATER_THRESHOLD: f64 = 50.0; // %
const OIL_THRESHOLD: f64 = 30.0; // %
const SMOOTH_WIDTH: i64 = 100;
const CHANNELS: i64 = 7;
const MAX_CHANNELS: i64 = 8;
const SAMPLE_MS: i64 = 100;
const MIN_SAMPLE_MS: i64 = 10;
const HTTP_PORT: i64 = 8080;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub levels: Levels,
    pub sensor: Sensor,
    pub web: Web,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Levels {
    /// Smoothed readings above this are water.
    pub water_threshold: f64,
    /// Above this (and not water) is oil; below is air.
    pub oil_threshold: f64,
    pub smooth_width: i64,
    /// Probes wired to ADC inputs `0..channels`.
    pub channels: i64,
    pub sample_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Sensor {
    pub simulate: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Web {
    pub enabled: bool,
    pub port: i64,
}

impl Default for Levels {
    fn default() -> Self {
        Self {
            water_threshold: WATER_THRESHOLD,
            oil_threshold: OIL_THRESHOLD,
            smooth_width: SMOOTH_WIDTH,
            channels: CHANNELS,
            sample_ms: SAMPLE_MS,
        }
    }
}

impl Default for Web {
    fn default() -> Self {
        Self {
            enabled: false,
            port: HTTP_PORT,
        }
    }
}

// ---------------------------------------------------------------------------
// Sanitising
// ---------------------------------------------------------------------------

impl Config {
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let l = &mut self.levels;

        for (name, slot, default) in [
            ("water_threshold", &mut l.water_threshold, WATER_THRESHOLD),
            ("oil_threshold", &mut l.oil_threshold, OIL_THRESHOLD),
        ] {
            if !(0.0..=100.0).contains(&*slot) {
                warnings.push(format!("{name} {slot} out of range 0..=100, using {default}"));
                *slot = default;
            }
        }

        if l.oil_threshold >= l.water_threshold {
            warnings.push(format!(
                "oil_threshold {} must be below water_threshold {}, using {OIL_THRESHOLD} / {WATER_THRESHOLD}",
                l.oil_threshold, l.water_threshold
            ));
            l.oil_threshold = OIL_THRESHOLD;
            l.water_threshold = WATER_THRESHOLD;
        }

        if l.smooth_width < 1 {
            warnings.push(format!(
                "smooth_width must be at least 1 (got {}), using {SMOOTH_WIDTH}",
                l.smooth_width
            ));
            l.smooth_width = SMOOTH_WIDTH;
        }

        if !(1..=MAX_CHANNELS).contains(&l.channels) {
            warnings.push(format!(
                "channels {} out of range 1..={MAX_CHANNELS}, using {CHANNELS}",
                l.channels
            ));
            l.channels = CHANNELS;
        }

        if l.sample_ms < MIN_SAMPLE_MS {
            warnings.push(format!(
                "sample_ms must be at least {MIN_SAMPLE_MS} (got {}), using {SAMPLE_MS}",
                l.sample_ms
            ));
            l.sample_ms = SAMPLE_MS;
        }

        if !(1..=65535).contains(&self.web.port) {
            warnings.push(format!(
                "http port {} out of range, using {HTTP_PORT}",
                self.web.port
            ));
            self.web.port = HTTP_PORT;
        }

        warnings
    }

    /// Call after [`Config::sanitize`].
    pub fn settings(&self) -> Settings {
        let l = &self.levels;
        Settings {
            water_threshold: l.water_threshold,
            oil_threshold: l.oil_threshold,
            smooth_width: l.smooth_width.max(1) as usize,
            channels: l.channels.clamp(1, MAX_CHANNELS) as u8,
            period: Duration::from_millis(l.sample_ms.max(MIN_SAMPLE_MS) as u64),
        }
    }

    pub fn http_port(&self) -> u16 {
        u16::try_from(self.web.port).unwrap_or(HTTP_PORT as u16)
    }
}

// ---------------------------------------------------------------------------
// Load + env overrides
// ---------------------------------------------------------------------------

pub fn load(path: &str, explicit: bool, warnings: &mut Vec<String>) -> Config {
    layered::load(path, explicit, warnings)
}

pub fn apply_env<F>(cfg: &mut Config, lookup: F, warnings: &mut Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    let l = &mut cfg.levels;
    override_parsed(&lookup, "WATER_THRESHOLD", &mut l.water_threshold, warnings);
    override_parsed(&lookup, "OIL_THRESHOLD", &mut l.oil_threshold, warnings);
    override_parsed(&lookup, "SMOOTH_WIDTH", &mut l.smooth_width, warnings);
    override_parsed(&lookup, "CHANNELS", &mut l.channels, warnings);
    override_parsed(&lookup, "SAMPLE_MS", &mut l.sample_ms, warnings);
    override_parsed(&lookup, "HTTP_PORT", &mut cfg.web.port, warnings);
    override_bool(&lookup, "SIMULATE_SENSOR", &mut cfg.sensor.simulate, warnings);
    override_bool(&lookup, "WITH_REST_SERVER", &mut cfg.web.enabled, warnings);
}

// ===========================================================================
// Tests
// ===========================================================================
