//! Ordered-threshold classification of a smoothed value into a label.
//!
//! Bands are checked from the highest lower bound down; the first bound the
//! value is strictly greater than wins.  A value sitting exactly on a bound
//! belongs to the band below it.  Nothing matched yields the `below` label.

/// A label and the bound a value must exceed to earn it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band<L> {
    pub label: L,
    pub lower: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds<L> {
    /// Sorted by `lower`, highest first.
    bands: Vec<Band<L>>,
    below: L,
}

impl<L: Copy> Thresholds<L> {
    pub fn new(bands: impl IntoIterator<Item = (L, f64)>, below: L) -> Self {
        let mut bands: Vec<Band<L>> = bands
            .into_iter()
            .map(|(label, lower)| Band { label, lower })
            .collect();
        bands.sort_by(|a, b| b.lower.total_cmp(&a.lower));
        Self { bands, below }
    }

    pub fn classify(&self, value: f64) -> L {
        classify(value, &self.bands, self.below)
    }

    pub fn bands(&self) -> &[Band<L>] {
        &self.bands
    }
}

/// Classify against `bands`, which must already be ordered highest first.
///
/// `NaN` exceeds nothing and lands in `below`.
pub fn classify<L: Copy>(value: f64, bands: &[Band<L>], below: L) -> L {
    bands
        .iter()
        .find(|b| value > b.lower)
        .map(|b| b.label)
        .unwrap_or(below)
}

// ===========================================================================
// Tests
// ===========================================================================
