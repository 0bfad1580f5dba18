use rpi_control::Phase;
use serde::Serialize;
use time::OffsetDateTime;

use crate::control::{Moisture, Settings};

pub const WATCHING: &str = "Watching the probe...";

/// Everything the status endpoint reports.  Flat on purpose: numbers stay
/// numbers, enums render as upper-case strings, unknowns are `null`.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub raw: Option<i32>,
    pub humidity: Option<f64>,
    pub smoothed: Option<f64>,
    pub moisture: Option<Moisture>,
    /// Air temperature, °C, when the source has a thermometer.
    pub temperature: Option<f64>,
    /// °C, from the latest humidity and temperature.
    pub dew_point: Option<f64>,
    pub actuator_on: bool,
    pub phase: Phase,
    pub remaining_sec: Option<u64>,
    /// Epoch milliseconds.
    pub last_watering_ms: Option<i64>,
    pub message: String,
    pub source: &'static str,
    pub sensor_errors: u64,
    pub water_below: f64,
    pub water_during_sec: u64,
    pub resume_after_sec: u64,
}

impl Snapshot {
    pub fn new(settings: &Settings, source: &'static str) -> Self {
        Self {
            raw: None,
            humidity: None,
            smoothed: None,
            moisture: None,
            temperature: None,
            dew_point: None,
            actuator_on: false,
            phase: Phase::Idle,
            remaining_sec: None,
            last_watering_ms: None,
            message: WATCHING.to_string(),
            source,
            sensor_errors: 0,
            water_below: settings.water_below,
            water_during_sec: settings.duration.as_secs(),
            resume_after_sec: settings.cooldown.as_secs(),
        }
    }
}

pub fn epoch_ms(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings() -> Settings {
        Settings {
            channel: 0,
            water_below: 35.0,
            duration: Duration::from_secs(10),
            cooldown: Duration::from_secs(120),
            smooth_width: 10,
            poll: Duration::from_secs(1),
        }
    }

    #[test]
    fn fresh_snapshot_serializes_flat() {
        let json = serde_json::to_value(Snapshot::new(&settings(), "manual")).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.values().all(|v| !v.is_object() && !v.is_array()));
        assert_eq!(json["phase"], "IDLE");
        assert_eq!(json["actuator_on"], false);
        assert!(json["humidity"].is_null());
        assert!(json["temperature"].is_null());
        assert!(json["dew_point"].is_null());
        assert!(json["last_watering_ms"].is_null());
        assert_eq!(json["water_below"], 35.0);
        assert_eq!(json["resume_after_sec"], 120);
        assert_eq!(json["message"], WATCHING);
    }

    #[test]
    fn moisture_serializes_upper_case() {
        let mut snap = Snapshot::new(&settings(), "simulated");
        snap.moisture = Some(Moisture::Dry);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["moisture"], "DRY");
    }

    #[test]
    fn epoch_ms_of_known_instant() {
        let t = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(epoch_ms(t), 1_700_000_000_000);
    }
}
