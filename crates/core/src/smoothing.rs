//! Per-channel moving average over a bounded window of recent readings.
//!
//! Each channel owns a FIFO of at most `width` values.  A new reading is
//! appended, the oldest ones are evicted until the window fits again, and
//! the arithmetic mean of what is left is the smoothed value.  A channel's
//! first smoothed value is therefore its first reading.

use std::collections::{BTreeMap, VecDeque};

/// Window width used when none is configured.
pub const DEFAULT_WIDTH: usize = 100;

// ---------------------------------------------------------------------------
// Single window
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Window {
    width: usize,
    values: VecDeque<f64>,
}

impl Window {
    /// A zero width is treated as 1.
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            width,
            values: VecDeque::with_capacity(width),
        }
    }

    /// Append `value`, evict from the front while over width, return the mean.
    pub fn push(&mut self, value: f64) -> f64 {
        self.values.push_back(value);
        while self.values.len() > self.width {
            self.values.pop_front();
        }
        self.mean().unwrap_or(value)
    }

    /// Mean of the current contents, `None` while empty.
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f64 = self.values.iter().sum();
        Some(sum / self.values.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}

// ---------------------------------------------------------------------------
// Channel group
// ---------------------------------------------------------------------------

/// One window per channel, all sharing the same width.
///
/// Not synchronised: the loop that samples a group of channels owns it.
#[derive(Debug, Clone)]
pub struct Smoother {
    width: usize,
    windows: BTreeMap<u8, Window>,
}

impl Smoother {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            windows: BTreeMap::new(),
        }
    }

    /// Feed one reading for `channel` and return its smoothed value.
    pub fn observe(&mut self, channel: u8, value: f64) -> f64 {
        let width = self.width;
        self.windows
            .entry(channel)
            .or_insert_with(|| Window::new(width))
            .push(value)
    }

    /// Current smoothed value for `channel`, `None` before its first reading.
    pub fn smoothed(&self, channel: u8) -> Option<f64> {
        self.windows.get(&channel).and_then(Window::mean)
    }

    /// Forget everything seen on `channel`; its next reading starts a fresh
    /// window.
    pub fn reset(&mut self, channel: u8) {
        self.windows.remove(&channel);
    }

    pub fn window(&self, channel: u8) -> Option<&Window> {
        self.windows.get(&channel)
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "expected {b}, got {a}");
    }

    /// Reference mean over the last `min(n, width)` values of `seq[..=n]`.
    fn trailing_mean(seq: &[f64], upto: usize, width: usize) -> f64 {
        let end = upto + 1;
        let start = end.saturating_sub(width);
        let tail = &seq[start..end];
        tail.iter().sum::<f64>() / tail.len() as f64
    }

    // -- Window ------------------------------------------------------------

    #[test]
    fn first_value_is_its_own_mean() {
        let mut w = Window::new(5);
        assert_close(w.push(42.0), 42.0);
    }

    #[test]
    fn width_three_scenario() {
        let mut w = Window::new(3);
        let out: Vec<f64> = [10.0, 20.0, 30.0].iter().map(|&v| w.push(v)).collect();
        assert_eq!(out, vec![10.0, 15.0, 20.0]);
    }

    #[test]
    fn evicts_oldest_once_full() {
        let mut w = Window::new(3);
        for v in [10.0, 20.0, 30.0, 40.0] {
            w.push(v);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.values().collect::<Vec<_>>(), vec![20.0, 30.0, 40.0]);
        assert_close(w.mean().unwrap(), 30.0);
    }

    #[test]
    fn zero_width_behaves_like_one() {
        let mut w = Window::new(0);
        assert_eq!(w.width(), 1);
        w.push(1.0);
        assert_close(w.push(9.0), 9.0);
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn empty_window_has_no_mean() {
        let w = Window::new(4);
        assert!(w.is_empty());
        assert!(w.mean().is_none());
    }

    #[test]
    fn mean_matches_trailing_mean_for_many_widths() {
        let seq: Vec<f64> = (0..60).map(|i| ((i * 37) % 101) as f64 - 20.5).collect();
        for width in 1..=12 {
            let mut w = Window::new(width);
            for (i, &v) in seq.iter().enumerate() {
                let got = w.push(v);
                assert_close(got, trailing_mean(&seq, i, width));
                assert!(w.len() <= width);
            }
        }
    }

    // -- Smoother ----------------------------------------------------------

    #[test]
    fn channels_are_independent() {
        let mut s = Smoother::new(2);
        s.observe(0, 10.0);
        s.observe(1, 100.0);
        assert_close(s.observe(0, 20.0), 15.0);
        assert_close(s.observe(1, 50.0), 75.0);
        assert_eq!(s.window(0).unwrap().len(), 2);
    }

    #[test]
    fn smoothed_is_none_for_unseen_channel() {
        let mut s = Smoother::new(3);
        s.observe(2, 7.0);
        assert!(s.smoothed(0).is_none());
        assert_close(s.smoothed(2).unwrap(), 7.0);
    }

    #[test]
    fn reset_starts_a_fresh_window() {
        let mut s = Smoother::new(5);
        s.observe(0, 20.0);
        s.observe(0, 20.0);
        s.observe(1, 60.0);
        s.reset(0);
        assert!(s.smoothed(0).is_none());
        assert_close(s.observe(0, 70.0), 70.0);
        assert_close(s.smoothed(1).unwrap(), 60.0);
    }

    #[test]
    fn default_width() {
        assert_eq!(Smoother::default().width(), DEFAULT_WIDTH);
    }
}
