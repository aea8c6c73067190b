// =============================================================================
// Price alarms — fire-once threshold crossings per symbol
// =============================================================================
//
// A threshold fires when it lies between the previous and the current price,
// inclusive on both ends, whichever direction the price moved. Only the first
// matching threshold (in insertion order) fires per evaluation, and it is
// removed from the set when it does.

use crate::error::{EngineError, EngineResult};

/// Unique price thresholds for one symbol, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlarmSet {
    thresholds: Vec<f64>,
}

/// `true` when `threshold` lies between the two prices (inclusive).
pub fn crosses(previous: f64, current: f64, threshold: f64) -> bool {
    if previous <= current {
        previous <= threshold && threshold <= current
    } else {
        previous >= threshold && threshold >= current
    }
}

impl AlarmSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a threshold. Returns `Ok(false)` when it is already present.
    pub fn add(&mut self, threshold: f64) -> EngineResult<bool> {
        if !threshold.is_finite() {
            return Err(EngineError::invalid(format!(
                "alarm threshold {threshold} is not finite"
            )));
        }
        if self.thresholds.contains(&threshold) {
            return Ok(false);
        }
        self.thresholds.push(threshold);
        Ok(true)
    }

    /// Remove a threshold. Returns `false` when it was not present.
    pub fn remove(&mut self, threshold: f64) -> bool {
        match self.thresholds.iter().position(|&t| t == threshold) {
            Some(pos) => {
                self.thresholds.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.thresholds.clear();
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// First threshold crossed by the move `previous -> current`, without
    /// modifying the set.
    pub fn first_crossed(&self, current: f64, previous: f64) -> Option<f64> {
        self.thresholds
            .iter()
            .copied()
            .find(|&t| crosses(previous, current, t))
    }

    /// Evaluate a price move: the first crossed threshold is removed and
    /// returned. No match leaves the set unchanged.
    pub fn evaluate(&mut self, current: f64, previous: f64) -> Option<f64> {
        let hit = self.first_crossed(current, previous)?;
        self.remove(hit);
        Some(hit)
    }
}
