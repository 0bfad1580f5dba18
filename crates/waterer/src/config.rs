//! Layered configuration: built-in defaults, an optional TOML file, then
//! environment overrides.  Nothing here is fatal: a bad file, a bad env
//! value or an out-of-range setting each produce a warning and the
//! documented default.

use rpi_control::config::{self as layered, override_bool, override_parsed};
use rpi_control::sim::Scenario;
use serde::Deserialize;
use std::time::Duration;

use crate::control::Settings;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_PATH: &str = "waterer.toml";

const WATER_BELOW: f64 = 35.0; // %
const WATER_DURING_SEC: i64 = 10;
const RESUME_AFTER_SEC: i64 = 120;
/// Longest watering or resume delay accepted, one day.
const MAX_DURATION_SEC: i64 = 86_400;
const SMOOTH_WIDTH: i64 = 10;
const POLL_MS: i64 = 1_000;
const MIN_POLL_MS: i64 = 100;
const SENSOR_CHANNEL: i64 = 0;
const RELAY_PIN: i64 = 17;
const HTTP_PORT: i64 = 9999;

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: std::ops::RangeInclusive<i64> = 2..=27;

/// MCP3008 single-ended inputs.
const VALID_CHANNELS: std::ops::RangeInclusive<i64> = 0..=7;

/// Scenario that reads the REST-pushed value instead of a humidity model.
pub const MANUAL: &str = "manual";

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub watering: Watering,
    pub relay: Relay,
    pub sensor: Sensor,
    pub web: Web,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Watering {
    /// Start watering when smoothed humidity drops below this (%).
    pub water_below: f64,
    pub water_during_sec: i64,
    /// Sensor watch resumes this long after the valve closes.
    pub resume_after_sec: i64,
    pub smooth_width: i64,
    pub poll_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Relay {
    pub pin: i64,
    pub active_low: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Sensor {
    pub channel: i64,
    /// Skip the ADC even if it is available.
    pub simulate: bool,
    /// Simulator used when not reading hardware: `manual` (REST input) or
    /// one of the humidity scenarios.
    pub scenario: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Web {
    pub enabled: bool,
    pub port: i64,
}

impl Default for Watering {
    fn default() -> Self {
        Self {
            water_below: WATER_BELOW,
            water_during_sec: WATER_DURING_SEC,
            resume_after_sec: RESUME_AFTER_SEC,
            smooth_width: SMOOTH_WIDTH,
            poll_ms: POLL_MS,
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            pin: RELAY_PIN,
            active_low: true,
        }
    }
}

impl Default for Sensor {
    fn default() -> Self {
        Self {
            channel: SENSOR_CHANNEL,
            simulate: false,
            scenario: MANUAL.to_string(),
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
    /// Reset every out-of-range value to its default.  Returns one message
    /// per correction (not just the first one).
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let w = &mut self.watering;

        if !(0.0..=100.0).contains(&w.water_below) {
            warnings.push(format!(
                "water_below {} out of range [0, 100], using {WATER_BELOW}",
                w.water_below
            ));
            w.water_below = WATER_BELOW;
        }
        if !(0..=MAX_DURATION_SEC).contains(&w.water_during_sec) {
            warnings.push(format!(
                "water_during_sec {} out of range [0, {MAX_DURATION_SEC}], using {WATER_DURING_SEC}",
                w.water_during_sec
            ));
            w.water_during_sec = WATER_DURING_SEC;
        }
        if !(0..=MAX_DURATION_SEC).contains(&w.resume_after_sec) {
            warnings.push(format!(
                "resume_after_sec {} out of range [0, {MAX_DURATION_SEC}], using {RESUME_AFTER_SEC}",
                w.resume_after_sec
            ));
            w.resume_after_sec = RESUME_AFTER_SEC;
        }
        if w.smooth_width < 1 {
            warnings.push(format!(
                "smooth_width must be at least 1, got {}, using {SMOOTH_WIDTH}",
                w.smooth_width
            ));
            w.smooth_width = SMOOTH_WIDTH;
        }
        if w.poll_ms < MIN_POLL_MS {
            warnings.push(format!(
                "poll_ms must be at least {MIN_POLL_MS}, got {}, using {POLL_MS}",
                w.poll_ms
            ));
            w.poll_ms = POLL_MS;
        }

        if !VALID_GPIO_PINS.contains(&self.relay.pin) {
            warnings.push(format!(
                "relay pin {} is not a valid BCM GPIO pin (allowed: 2-27), using {RELAY_PIN}",
                self.relay.pin
            ));
            self.relay.pin = RELAY_PIN;
        }

        if !VALID_CHANNELS.contains(&self.sensor.channel) {
            warnings.push(format!(
                "sensor channel {} out of range (0-7), using {SENSOR_CHANNEL}",
                self.sensor.channel
            ));
            self.sensor.channel = SENSOR_CHANNEL;
        }
        let scenario = self.sensor.scenario.trim().to_ascii_lowercase();
        if scenario == MANUAL || scenario.parse::<Scenario>().is_ok() {
            self.sensor.scenario = scenario;
        } else {
            warnings.push(format!(
                "unknown simulator scenario '{}', using {MANUAL}",
                self.sensor.scenario
            ));
            self.sensor.scenario = MANUAL.to_string();
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

    /// Control-loop settings.  Call after [`Config::sanitize`].
    pub fn settings(&self) -> Settings {
        let w = &self.watering;
        Settings {
            channel: self.sensor.channel.clamp(0, 7) as u8,
            water_below: w.water_below,
            duration: Duration::from_secs(w.water_during_sec.max(0) as u64),
            cooldown: Duration::from_secs(w.resume_after_sec.max(0) as u64),
            smooth_width: w.smooth_width.max(1) as usize,
            poll: Duration::from_millis(w.poll_ms.max(MIN_POLL_MS) as u64),
        }
    }

    pub fn relay_pin(&self) -> u8 {
        self.relay.pin.clamp(0, 255) as u8
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

#[cfg(test)]
fn parse(contents: &str, path: &str, warnings: &mut Vec<String>) -> Config {
    layered::parse(contents, path, warnings)
}

/// Apply environment overrides.  `lookup` is `std::env::var` in production.
pub fn apply_env<F>(cfg: &mut Config, lookup: F, warnings: &mut Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    let mut num = |key: &str, slot: &mut i64| override_parsed(&lookup, key, slot, warnings);
    num("WATER_DURING", &mut cfg.watering.water_during_sec);
    num("RESUME_AFTER", &mut cfg.watering.resume_after_sec);
    num("SMOOTH_WIDTH", &mut cfg.watering.smooth_width);
    num("POLL_MS", &mut cfg.watering.poll_ms);
    num("SENSOR_CHANNEL", &mut cfg.sensor.channel);
    num("RELAY_PIN", &mut cfg.relay.pin);
    num("HTTP_PORT", &mut cfg.web.port);

    override_parsed(&lookup, "WATER_BELOW", &mut cfg.watering.water_below, warnings);

    let mut flag = |key: &str, slot: &mut bool| override_bool(&lookup, key, slot, warnings);
    flag("RELAY_ACTIVE_LOW", &mut cfg.relay.active_low);
    flag("SIMULATE_SENSOR", &mut cfg.sensor.simulate);
    flag("WITH_REST_SERVER", &mut cfg.web.enabled);

    if let Some(v) = lookup("SIM_SCENARIO") {
        cfg.sensor.scenario = v.trim().to_string();
    }
}

// ===========================================================================
// Tests
// ===========================================================================
