//! Per-channel liquid detection.
//!
//! Every probe in the tank sits on its own ADC input.  Each sample is
//! smoothed over a per-channel window and the mean is classified against two
//! bounds: above `water_threshold` is water, above `oil_threshold` is oil,
//! anything else is air.  Bounds are strict, so a mean exactly on a bound
//! belongs to the band below it.
//!
//! Samples enter the window as whole percents (truncated), so a conversion
//! a hair above a bound does not tip the channel over it.

use std::time::Duration;

use anyhow::Result;
use rpi_control::{Sample, SensorSource, Shutdown, Smoother, StatusBoard, Thresholds};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub water_threshold: f64,
    pub oil_threshold: f64,
    pub smooth_width: usize,
    pub channels: u8,
    pub period: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Material {
    /// No reading yet.
    #[default]
    Unknown,
    Air,
    Oil,
    Water,
}

impl Material {
    pub fn thresholds(water: f64, oil: f64) -> Thresholds<Material> {
        Thresholds::new([(Material::Water, water), (Material::Oil, oil)], Material::Air)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelLevel {
    pub channel: u8,
    pub raw: Option<i32>,
    pub value: Option<f64>,
    pub smoothed: Option<f64>,
    /// Readings currently in the smoothing window.
    pub samples: usize,
    pub material: Material,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Levels {
    pub channels: Vec<ChannelLevel>,
    pub water_threshold: f64,
    pub oil_threshold: f64,
    pub read_errors: u64,
}

impl Levels {
    pub fn new(settings: &Settings) -> Self {
        Self {
            channels: (0..settings.channels)
                .map(|channel| ChannelLevel {
                    channel,
                    raw: None,
                    value: None,
                    smoothed: None,
                    samples: 0,
                    material: Material::Unknown,
                })
                .collect(),
            water_threshold: settings.water_threshold,
            oil_threshold: settings.oil_threshold,
            read_errors: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

pub struct LevelReader<S> {
    source: S,
    smoother: Smoother,
    thresholds: Thresholds<Material>,
    channels: u8,
    period: Duration,
    board: StatusBoard<Levels>,
}

impl<S: SensorSource> LevelReader<S> {
    pub fn new(source: S, settings: &Settings, board: StatusBoard<Levels>) -> Self {
        Self {
            source,
            smoother: Smoother::new(settings.smooth_width),
            thresholds: Material::thresholds(settings.water_threshold, settings.oil_threshold),
            channels: settings.channels,
            period: settings.period,
            board,
        }
    }

    /// Smooth and classify one sample, publish it, and return the material.
    pub fn observe(&mut self, channel: u8, sample: Sample) -> Material {
        let value = sample.value.trunc();
        let smoothed = self.smoother.observe(channel, value);
        let samples = self.smoother.window(channel).map_or(0, |w| w.len());
        let material = self.thresholds.classify(smoothed);

        let mut changed = None;
        self.board.update(|levels| {
            let Some(slot) = levels.channels.get_mut(usize::from(channel)) else {
                return;
            };
            if slot.material != material {
                changed = Some(slot.material);
            }
            slot.raw = Some(sample.raw);
            slot.value = Some(value);
            slot.smoothed = Some(smoothed);
            slot.samples = samples;
            slot.material = material;
        });

        if let Some(from) = changed {
            info!(channel, ?from, to = ?material, smoothed = format!("{smoothed:.2}"), "material changed");
        }
        material
    }

    /// Read every channel once.  Returns how many reads succeeded.
    pub fn sample_all(&mut self) -> usize {
        let mut ok = 0;
        for channel in 0..self.channels {
            match self.source.read(channel) {
                Ok(sample) => {
                    debug!(channel, raw = sample.raw, value = sample.value, "sample");
                    self.observe(channel, sample);
                    ok += 1;
                }
                Err(e) => {
                    warn!(channel, "read failed, keeping last value: {e:#}");
                    self.board.update(|l| l.read_errors += 1);
                }
            }
        }
        ok
    }

    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<()> {
        info!(
            source = self.source.name(),
            channels = self.channels,
            period_ms = self.period.as_millis() as u64,
            "Start observing."
        );
        while !shutdown.is_signalled() {
            self.sample_all();
            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = shutdown.wait() => break,
            }
        }
        info!("Stop observing.");
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
