//! Cancellable countdown: a spawned task that emits one tick per period and
//! a final [`Tick::Elapsed`] at the deadline.
//!
//! The consumer reads ticks over a small bounded channel.  If the shutdown
//! flag fires, the task stops without sending `Elapsed` and the channel
//! closes, which [`Countdown::next`] reports as `None`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::shutdown::Shutdown;

/// Status tick period used by the sequencer.
pub const TICK: Duration = Duration::from_secs(1);

/// Stand-in deadline for totals too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still running; time left until the deadline.
    Remaining(Duration),
    /// Deadline reached.  Always the last tick of a completed countdown.
    Elapsed,
}

pub struct Countdown {
    rx: mpsc::Receiver<Tick>,
    handle: JoinHandle<()>,
}

impl Countdown {
    /// Start counting down `total`, ticking every `period`.
    ///
    /// The first tick comes one `period` in; entering the phase is the
    /// caller's business.  A zero `total` yields a single `Elapsed`.
    pub fn start(total: Duration, period: Duration, shutdown: Shutdown) -> Self {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(run(total, period.max(Duration::from_millis(1)), tx, shutdown));
        Self { rx, handle }
    }

    /// Next tick, or `None` once the countdown was cancelled.
    pub async fn next(&mut self) -> Option<Tick> {
        self.rx.recv().await
    }

    /// A countdown whose task is already gone.
    #[cfg(test)]
    pub(crate) fn closed() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self {
            rx,
            handle: tokio::spawn(async {}),
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(total: Duration, period: Duration, tx: mpsc::Sender<Tick>, mut shutdown: Shutdown) {
    let start = Instant::now();
    let deadline = deadline_after(start, total);
    let mut next = deadline_after(start, period).min(deadline);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => {
                debug!("countdown cancelled");
                return;
            }
            _ = sleep_until(next) => {}
        }

        let now = Instant::now();
        let remaining = deadline.saturating_duration_since(now);
        let tick = if remaining.is_zero() {
            Tick::Elapsed
        } else {
            Tick::Remaining(remaining)
        };

        if tx.send(tick).await.is_err() {
            // Consumer went away.
            return;
        }
        if tick == Tick::Elapsed {
            return;
        }

        next = deadline_after(next, period);
        if next <= now {
            // Overran at least one whole period: drop the missed ticks.
            warn!(
                late_ms = (now - next).as_millis() as u64,
                "countdown tick overrun, skipping"
            );
            next = deadline_after(now, period);
        }
        next = next.min(deadline);
    }
}

/// `from + span`, saturating to a far-future instant instead of panicking.
fn deadline_after(from: Instant, span: Duration) -> Instant {
    from.checked_add(span)
        .unwrap_or_else(|| from + FAR_FUTURE)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;

    async fn drain(mut c: Countdown) -> (Vec<(u64, Tick)>, bool) {
        let t0 = Instant::now();
        let mut seen = Vec::new();
        while let Some(tick) = c.next().await {
            seen.push((t0.elapsed().as_secs(), tick));
            if tick == Tick::Elapsed {
                return (seen, true);
            }
        }
        (seen, false)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_second_then_elapses() {
        let (_trigger, sd) = shutdown::channel();
        let c = Countdown::start(Duration::from_secs(3), TICK, sd);
        let (seen, done) = drain(c).await;
        assert!(done);
        assert_eq!(
            seen,
            vec![
                (1, Tick::Remaining(Duration::from_secs(2))),
                (2, Tick::Remaining(Duration::from_secs(1))),
                (3, Tick::Elapsed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_elapses_immediately() {
        let (_trigger, sd) = shutdown::channel();
        let c = Countdown::start(Duration::ZERO, TICK, sd);
        let (seen, done) = drain(c).await;
        assert!(done);
        assert_eq!(seen, vec![(0, Tick::Elapsed)]);
    }

    #[tokio::test(start_paused = true)]
    async fn fractional_total_ends_on_deadline() {
        let (_trigger, sd) = shutdown::channel();
        let t0 = Instant::now();
        let mut c = Countdown::start(Duration::from_millis(2_500), TICK, sd);
        while let Some(tick) = c.next().await {
            if tick == Tick::Elapsed {
                break;
            }
        }
        assert_eq!(t0.elapsed(), Duration::from_millis(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_without_elapsed() {
        let (trigger, sd) = shutdown::channel();
        let mut c = Countdown::start(Duration::from_secs(60), TICK, sd);
        assert!(matches!(c.next().await, Some(Tick::Remaining(_))));
        trigger.fire();
        let mut last = None;
        while let Some(t) = c.next().await {
            last = Some(t);
        }
        assert_ne!(last, Some(Tick::Elapsed));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_total_keeps_ticking() {
        let (_trigger, sd) = shutdown::channel();
        let mut c = Countdown::start(Duration::MAX, TICK, sd);
        for _ in 0..3 {
            match c.next().await {
                Some(Tick::Remaining(left)) => assert!(left > Duration::from_secs(86_400)),
                other => panic!("expected a remaining tick, got {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn already_signalled_never_ticks() {
        let (trigger, sd) = shutdown::channel();
        trigger.fire();
        let mut c = Countdown::start(Duration::from_secs(5), TICK, sd);
        assert_eq!(c.next().await, None);
    }
}
