//! Watering control loop: read the probe, smooth, decide, and hand a dry
//! reading to the sequencer.
//!
//! While a cycle runs (valve open, then the resume delay) the loop is parked
//! inside [`Sequencer::run_cycle`], so the probe is not evaluated again until
//! the sequencer is back in `Idle`.  Presentation lives in [`publish`]: the
//! sequencer only reports [`Status`] values, this module turns them into the
//! snapshot and the log.

use std::time::Duration;

use anyhow::Result;
use rpi_control::climate::dew_point;
use rpi_control::{
    Actuator, Cycle, Phase, Sample, SensorSource, Sequencer, Shutdown, Smoother, Status,
    StatusBoard,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::state::{epoch_ms, Snapshot, WATCHING};

// ---------------------------------------------------------------------------
// Settings & decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub channel: u8,
    /// Percent; strictly below this is dry.
    pub water_below: f64,
    pub duration: Duration,
    pub cooldown: Duration,
    pub smooth_width: usize,
    pub poll: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Moisture {
    Dry,
    Ok,
}

impl Moisture {
    pub fn assess(humidity: f64, water_below: f64) -> Self {
        if humidity < water_below {
            Self::Dry
        } else {
            Self::Ok
        }
    }
}

/// Result of one pass of the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Probe evaluated, nothing to do.
    Watched { smoothed: f64, moisture: Moisture },
    /// Probe was dry and a watering cycle ran.
    Watered(Cycle),
    /// Probe read failed; last known values kept.
    Skipped,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct Controller<S, A> {
    source: S,
    sequencer: Sequencer<A>,
    smoother: Smoother,
    settings: Settings,
    board: StatusBoard<Snapshot>,
    last: Option<Sample>,
}

impl<S: SensorSource, A: Actuator> Controller<S, A> {
    pub fn new(source: S, actuator: A, settings: Settings, board: StatusBoard<Snapshot>) -> Self {
        Self {
            source,
            sequencer: Sequencer::new(actuator, settings.duration, settings.cooldown),
            smoother: Smoother::new(settings.smooth_width),
            settings,
            board,
            last: None,
        }
    }

    pub fn last_sample(&self) -> Option<Sample> {
        self.last
    }

    /// Run until `shutdown` fires or the actuator fails.  On every exit path
    /// the actuator ends up OFF (or an OFF was at least attempted).
    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<()> {
        info!(
            source = self.source.name(),
            channel = self.settings.channel,
            water_below = self.settings.water_below,
            duration_sec = self.settings.duration.as_secs(),
            cooldown_sec = self.settings.cooldown.as_secs(),
            smooth_width = self.settings.smooth_width,
            "control loop started"
        );

        let result = self.watch(&mut shutdown).await;

        let released = self.sequencer.release();
        if let Err(e) = &released {
            error!("failed to switch actuator off at exit: {e:#}");
        }
        let on = self.sequencer.actuator().is_on();
        self.board.update(|s| {
            s.phase = Phase::Idle;
            s.actuator_on = on;
            s.remaining_sec = None;
            s.message = "Stopped.".to_string();
        });
        info!("control loop stopped");

        result.and(released)
    }

    async fn watch(&mut self, shutdown: &mut Shutdown) -> Result<()> {
        loop {
            if shutdown.is_signalled() {
                return Ok(());
            }
            if let Err(e) = self.tick(shutdown).await {
                error!("fatal: {e:#}");
                return Err(e);
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll) => {}
                _ = shutdown.wait() => return Ok(()),
            }
        }
    }

    /// One read → smooth → decide pass.  `Err` only for actuator failures.
    pub async fn tick(&mut self, shutdown: &Shutdown) -> Result<TickOutcome> {
        let channel = self.settings.channel;
        let sample = match self.source.read(channel) {
            Ok(s) => s,
            Err(e) => {
                warn!(channel, "sensor read failed, keeping last value: {e:#}");
                self.board.update(|s| s.sensor_errors += 1);
                return Ok(TickOutcome::Skipped);
            }
        };
        self.last = Some(sample);

        let temperature = match self.source.temperature() {
            Ok(t) => t,
            Err(e) => {
                warn!("temperature read failed: {e:#}");
                None
            }
        };
        let dew = temperature.and_then(|t| dew_point(sample.value, t));

        let smoothed = self.smoother.observe(channel, sample.value);
        let moisture = Moisture::assess(smoothed, self.settings.water_below);

        info!(
            raw = sample.raw,
            humidity = format!("{:.2}", sample.value),
            smoothed = format!("{smoothed:.2}"),
            temperature = temperature.map(|t| format!("{t:.1}")),
            dew_point = dew.map(|d| format!("{d:.1}")),
            ?moisture,
            "reading"
        );
        self.board.update(|s| {
            s.raw = Some(sample.raw);
            s.humidity = Some(sample.value);
            s.smoothed = Some(smoothed);
            s.moisture = Some(moisture);
            s.temperature = temperature;
            s.dew_point = dew;
            s.message = WATCHING.to_string();
        });

        if moisture == Moisture::Dry && self.sequencer.accepts_trigger() {
            info!(
                smoothed = format!("{smoothed:.2}"),
                water_below = self.settings.water_below,
                "humidity below threshold, watering"
            );
            let board = &self.board;
            let cycle = self
                .sequencer
                .run_cycle(shutdown, &mut |status: &Status| publish(board, status))
                .await?;
            // Readings from before the watering no longer describe the soil.
            self.smoother.reset(channel);
            return Ok(TickOutcome::Watered(cycle));
        }

        Ok(TickOutcome::Watched { smoothed, moisture })
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// Observer for sequencer updates: log and mirror into the snapshot.
fn publish(board: &StatusBoard<Snapshot>, status: &Status) {
    let message = describe(status);
    match status.remaining {
        Some(left) => debug!(phase = ?status.phase, remaining_sec = left.as_secs(), "{message}"),
        None => info!(phase = ?status.phase, "{message}"),
    }
    board.update(|s| {
        s.phase = status.phase;
        s.actuator_on = status.actuator_on;
        s.remaining_sec = status.remaining.map(|d| d.as_secs());
        s.last_watering_ms = status.last_actuation.map(epoch_ms);
        s.message = message;
    });
}

pub fn describe(status: &Status) -> String {
    match (status.phase, status.remaining) {
        (Phase::Actuating, Some(left)) => {
            format!("Stop watering in {}...", fmt_hms(left.as_secs()))
        }
        (Phase::Actuating, None) => "Watering...".to_string(),
        (Phase::Cooldown, Some(left)) => {
            format!(
                "Napping a bit... resuming watching in {}...",
                fmt_hms(left.as_secs())
            )
        }
        (Phase::Cooldown, None) => "Napping a bit...".to_string(),
        (Phase::Idle, _) => "Resuming watching.".to_string(),
    }
}

/// `3725` → `"1h 02m 05s"`, `65` → `"1m 05s"`, `9` → `"9s"`.
pub fn fmt_hms(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

// ===========================================================================
// Tests
// ===========================================================================
