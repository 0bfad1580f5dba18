//! Timed actuation cycle: switch on, count down, switch off, cool down.
//!
//! ```text
//! Idle ──[trigger]──▶ Actuating ──[duration elapsed]──▶ Cooldown
//!  ▲                      │                                │
//!  │               [shutdown: force OFF]                   │
//!  └──────────────────────┴──────[cooldown elapsed]────────┘
//! ```
//!
//! A cycle runs to completion inside [`Sequencer::run_cycle`]; the caller is
//! blocked for the whole of it, so no sensor evaluation can re-trigger while
//! the actuator is on or cooling down.  Countdown ticks come from a separate
//! timer task (see [`crate::timer`]) and are forwarded to the observer as
//! [`Status`] updates.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::relay::Actuator;
use crate::shutdown::Shutdown;
use crate::timer::{Countdown, Tick, TICK};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Idle,
    Actuating,
    Cooldown,
}

/// What the sequencer reports on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub phase: Phase,
    pub actuator_on: bool,
    /// Time left in the current timed phase.
    pub remaining: Option<Duration>,
    /// End of the most recent completed actuation.
    pub last_actuation: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// Ran through both timed phases and is back in `Idle`.
    Completed,
    /// Shutdown interrupted the cycle; the actuator has been forced off.
    Cancelled,
}

pub struct Sequencer<A> {
    actuator: A,
    duration: Duration,
    cooldown: Duration,
    tick: Duration,
    phase: Phase,
    last_actuation: Option<OffsetDateTime>,
}

impl<A: Actuator> Sequencer<A> {
    pub fn new(actuator: A, duration: Duration, cooldown: Duration) -> Self {
        Self {
            actuator,
            duration,
            cooldown,
            tick: TICK,
            phase: Phase::Idle,
            last_actuation: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// `true` only in `Idle`; the single gate for starting a cycle.
    pub fn accepts_trigger(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn last_actuation(&self) -> Option<OffsetDateTime> {
        self.last_actuation
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn status(&self) -> Status {
        self.status_with(None)
    }

    fn status_with(&self, remaining: Option<Duration>) -> Status {
        Status {
            phase: self.phase,
            actuator_on: self.actuator.is_on(),
            remaining,
            last_actuation: self.last_actuation,
        }
    }

    /// Run one full cycle.  `observer` sees every phase change and every
    /// countdown tick.
    ///
    /// Errors are actuator failures and are fatal to the caller; the
    /// sequencer has already tried to force the actuator off by then.
    pub async fn run_cycle<F>(&mut self, shutdown: &Shutdown, observer: &mut F) -> Result<Cycle>
    where
        F: FnMut(&Status),
    {
        anyhow::ensure!(
            self.accepts_trigger(),
            "actuation cycle already in progress ({:?})",
            self.phase
        );
        if shutdown.is_signalled() {
            return Ok(Cycle::Cancelled);
        }

        // ── Idle → Actuating ────────────────────────────────────────
        if let Err(e) = self.actuator.set(true) {
            self.emergency_off();
            return Err(e).context("failed to switch actuator on");
        }
        self.phase = Phase::Actuating;
        info!(duration_sec = self.duration.as_secs(), "actuation started");
        observer(&self.status_with(Some(self.duration)));

        if !self.count_down(self.duration, shutdown, observer).await {
            self.release().context("failed to switch actuator off on shutdown")?;
            observer(&self.status());
            return Ok(Cycle::Cancelled);
        }

        // ── Actuating → Cooldown ────────────────────────────────────
        if let Err(e) = self.actuator.set(false) {
            self.emergency_off();
            return Err(e).context("failed to switch actuator off");
        }
        self.last_actuation = Some(OffsetDateTime::now_utc());
        self.phase = Phase::Cooldown;
        info!(cooldown_sec = self.cooldown.as_secs(), "actuation done, cooling down");
        observer(&self.status_with(Some(self.cooldown)));

        if !self.count_down(self.cooldown, shutdown, observer).await {
            self.phase = Phase::Idle;
            observer(&self.status());
            return Ok(Cycle::Cancelled);
        }

        // ── Cooldown → Idle ─────────────────────────────────────────
        self.phase = Phase::Idle;
        info!("cooldown over, resuming");
        observer(&self.status());
        Ok(Cycle::Completed)
    }

    /// `true` when the countdown elapsed, `false` when it was cancelled.
    async fn count_down<F>(&self, total: Duration, shutdown: &Shutdown, observer: &mut F) -> bool
    where
        F: FnMut(&Status),
    {
        let countdown = Countdown::start(total, self.tick, shutdown.clone());
        self.follow(countdown, total, shutdown, observer).await
    }

    /// Forward `countdown`'s ticks.  Only shutdown may end a phase early: if
    /// the timer task dies on its own, the rest of the phase is waited out
    /// without ticks.
    async fn follow<F>(
        &self,
        mut countdown: Countdown,
        total: Duration,
        shutdown: &Shutdown,
        observer: &mut F,
    ) -> bool
    where
        F: FnMut(&Status),
    {
        let started = Instant::now();
        while let Some(tick) = countdown.next().await {
            match tick {
                Tick::Remaining(left) => observer(&self.status_with(Some(left))),
                Tick::Elapsed => return true,
            }
        }
        if shutdown.is_signalled() {
            return false;
        }

        let left = total.saturating_sub(started.elapsed());
        warn!(
            remaining_sec = left.as_secs(),
            phase = ?self.phase,
            "countdown stopped early, finishing the phase untimed"
        );
        let mut shutdown = shutdown.clone();
        tokio::select! {
            biased;
            _ = shutdown.wait() => false,
            _ = tokio::time::sleep(left) => true,
        }
    }

    /// Force the actuator off if it is on and return to `Idle`.  Safe to
    /// call in any phase; called on every exit path.
    pub fn release(&mut self) -> Result<()> {
        self.phase = Phase::Idle;
        if self.actuator.is_on() {
            warn!("actuator still on at release, forcing OFF");
            self.actuator.set(false)?;
        }
        Ok(())
    }

    /// Best-effort OFF after a failed command.
    fn emergency_off(&mut self) {
        self.phase = Phase::Idle;
        if let Err(e) = self.actuator.set(false) {
            error!("emergency OFF failed: {e:#}");
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use std::sync::{Arc, Mutex};

    /// Actuator that logs every command with the (paused) clock offset.
    #[derive(Clone)]
    struct Recorder {
        t0: Instant,
        log: Arc<Mutex<Vec<(Duration, bool)>>>,
        on: bool,
        fail_on: Option<bool>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                t0: Instant::now(),
                log: Arc::default(),
                on: false,
                fail_on: None,
            }
        }

        fn failing(cmd: bool) -> Self {
            Self {
                fail_on: Some(cmd),
                ..Self::new()
            }
        }

        fn commands(&self) -> Vec<(Duration, bool)> {
            self.log.lock().unwrap().clone()
        }
    }

    impl Actuator for Recorder {
        fn set(&mut self, on: bool) -> Result<()> {
            self.log.lock().unwrap().push((self.t0.elapsed(), on));
            if self.fail_on == Some(on) {
                anyhow::bail!("relay write failed");
            }
            self.on = on;
            Ok(())
        }

        fn is_on(&self) -> bool {
            self.on
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    // -- Full cycle -----------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn full_cycle_switches_on_then_off_then_idles() {
        let rec = Recorder::new();
        let mut seq = Sequencer::new(rec.clone(), secs(10), secs(120));
        let (_trigger, sd) = shutdown::channel();
        let t0 = Instant::now();
        let mut seen: Vec<(Duration, Phase)> = Vec::new();

        let cycle = seq
            .run_cycle(&sd, &mut |s: &Status| seen.push((t0.elapsed(), s.phase)))
            .await
            .unwrap();

        assert_eq!(cycle, Cycle::Completed);
        assert_eq!(rec.commands(), vec![(secs(0), true), (secs(10), false)]);
        assert_eq!(seq.phase(), Phase::Idle);
        assert!(seq.last_actuation().is_some());

        let first_cooldown = seen.iter().find(|(_, p)| *p == Phase::Cooldown).unwrap();
        assert_eq!(first_cooldown.0, secs(10));
        let (back_idle, phase) = *seen.last().unwrap();
        assert_eq!(phase, Phase::Idle);
        assert_eq!(back_idle, secs(130));
    }

    #[tokio::test(start_paused = true)]
    async fn emits_one_status_per_second() {
        let mut seq = Sequencer::new(Recorder::new(), secs(3), secs(2));
        let (_trigger, sd) = shutdown::channel();
        let mut remaining: Vec<(Phase, Option<u64>)> = Vec::new();

        seq.run_cycle(&sd, &mut |s: &Status| {
            remaining.push((s.phase, s.remaining.map(|d| d.as_secs())))
        })
        .await
        .unwrap();

        assert_eq!(
            remaining,
            vec![
                (Phase::Actuating, Some(3)),
                (Phase::Actuating, Some(2)),
                (Phase::Actuating, Some(1)),
                (Phase::Cooldown, Some(2)),
                (Phase::Cooldown, Some(1)),
                (Phase::Idle, None),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn actuator_state_reported_per_phase() {
        let mut seq = Sequencer::new(Recorder::new(), secs(1), secs(1));
        let (_trigger, sd) = shutdown::channel();
        let mut seen: Vec<(Phase, bool)> = Vec::new();
        seq.run_cycle(&sd, &mut |s: &Status| seen.push((s.phase, s.actuator_on)))
            .await
            .unwrap();
        for (phase, on) in seen {
            assert_eq!(on, phase == Phase::Actuating, "phase {phase:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_durations_complete_immediately() {
        let rec = Recorder::new();
        let mut seq = Sequencer::new(rec.clone(), Duration::ZERO, Duration::ZERO);
        let (_trigger, sd) = shutdown::channel();
        let cycle = seq.run_cycle(&sd, &mut |_: &Status| {}).await.unwrap();
        assert_eq!(cycle, Cycle::Completed);
        assert_eq!(rec.commands(), vec![(secs(0), true), (secs(0), false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_cycles_each_switch_once() {
        let rec = Recorder::new();
        let mut seq = Sequencer::new(rec.clone(), secs(2), secs(3));
        let (_trigger, sd) = shutdown::channel();
        for _ in 0..2 {
            seq.run_cycle(&sd, &mut |_: &Status| {}).await.unwrap();
        }
        let on_count = rec.commands().iter().filter(|(_, on)| *on).count();
        assert_eq!(on_count, 2);
        assert_eq!(rec.commands()[2].0, secs(5));
    }

    // -- Shutdown -------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_actuating_forces_off() {
        for fire_at in [0_u64, 1, 4, 9] {
            let rec = Recorder::new();
            let mut seq = Sequencer::new(rec.clone(), secs(10), secs(120));
            let (trigger, sd) = shutdown::channel();

            let task = tokio::spawn(async move {
                let cycle = seq.run_cycle(&sd, &mut |_: &Status| {}).await;
                (cycle, seq)
            });
            tokio::time::sleep(Duration::from_millis(fire_at * 1_000 + 500)).await;
            trigger.fire();
            let (cycle, seq) = task.await.unwrap();

            assert_eq!(cycle.unwrap(), Cycle::Cancelled, "fired at {fire_at}s");
            let cmds = rec.commands();
            assert_eq!(cmds.last().map(|c| c.1), Some(false), "fired at {fire_at}s");
            assert!(!seq.actuator().is_on());
            assert_eq!(seq.phase(), Phase::Idle);
            assert!(seq.last_actuation().is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_cooldown_keeps_single_off() {
        let rec = Recorder::new();
        let mut seq = Sequencer::new(rec.clone(), secs(2), secs(60));
        let (trigger, sd) = shutdown::channel();
        let task = tokio::spawn(async move { seq.run_cycle(&sd, &mut |_: &Status| {}).await });
        tokio::time::sleep(secs(30)).await;
        trigger.fire();
        assert_eq!(task.await.unwrap().unwrap(), Cycle::Cancelled);
        assert_eq!(rec.commands(), vec![(secs(0), true), (secs(2), false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn already_signalled_does_nothing() {
        let rec = Recorder::new();
        let mut seq = Sequencer::new(rec.clone(), secs(5), secs(5));
        let (trigger, sd) = shutdown::channel();
        trigger.fire();
        let cycle = seq.run_cycle(&sd, &mut |_: &Status| {}).await.unwrap();
        assert_eq!(cycle, Cycle::Cancelled);
        assert!(rec.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_duration_stays_on_until_shutdown() {
        let rec = Recorder::new();
        let mut seq = Sequencer::new(rec.clone(), secs(i64::MAX as u64), secs(1));
        let (trigger, sd) = shutdown::channel();
        let seen: Arc<Mutex<Vec<Phase>>> = Arc::default();
        let log = seen.clone();

        let task = tokio::spawn(async move {
            seq.run_cycle(&sd, &mut |s: &Status| log.lock().unwrap().push(s.phase))
                .await
        });
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(rec.commands(), vec![(secs(0), true)]);
        {
            let seen = seen.lock().unwrap();
            assert!(seen.len() >= 5, "only {} updates", seen.len());
            assert!(seen.iter().all(|p| *p == Phase::Actuating));
        }

        trigger.fire();
        assert_eq!(task.await.unwrap().unwrap(), Cycle::Cancelled);
        let off_at = Duration::from_millis(5_500);
        assert_eq!(rec.commands(), vec![(secs(0), true), (off_at, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_timer_finishes_phase_untimed() {
        let seq = Sequencer::new(Recorder::new(), secs(3), secs(3));
        let (_trigger, sd) = shutdown::channel();
        let t0 = Instant::now();
        let elapsed = seq
            .follow(Countdown::closed(), secs(3), &sd, &mut |_: &Status| {})
            .await;
        assert!(elapsed);
        assert_eq!(t0.elapsed(), secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn dead_timer_still_honours_shutdown() {
        let seq = Sequencer::new(Recorder::new(), secs(60), secs(60));
        let (trigger, sd) = shutdown::channel();
        let t0 = Instant::now();
        let fire = tokio::spawn(async move {
            tokio::time::sleep(secs(7)).await;
            trigger.fire();
        });
        let elapsed = seq
            .follow(Countdown::closed(), secs(60), &sd, &mut |_: &Status| {})
            .await;
        fire.await.unwrap();
        assert!(!elapsed);
        assert_eq!(t0.elapsed(), secs(7));
    }

    #[test]
    fn release_switches_off_only_when_on() {
        let rec = Recorder::new();
        let mut seq = Sequencer::new(rec.clone(), secs(1), secs(1));
        seq.release().unwrap();
        assert!(rec.commands().is_empty());
    }

    // -- Failures -------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn failed_on_is_fatal_and_attempts_off() {
        let rec = Recorder::failing(true);
        let mut seq = Sequencer::new(rec.clone(), secs(5), secs(5));
        let (_trigger, sd) = shutdown::channel();
        let err = seq.run_cycle(&sd, &mut |_: &Status| {}).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to switch actuator on"));
        assert_eq!(rec.commands().last().map(|c| c.1), Some(false));
        assert_eq!(seq.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_off_is_fatal() {
        let rec = Recorder::failing(false);
        let mut seq = Sequencer::new(rec.clone(), secs(5), secs(5));
        let (_trigger, sd) = shutdown::channel();
        let err = seq.run_cycle(&sd, &mut |_: &Status| {}).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to switch actuator off"));
        assert!(seq.last_actuation().is_none());
    }

    #[test]
    fn phase_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&Phase::Cooldown).unwrap(),
            "\"COOLDOWN\""
        );
    }
}
