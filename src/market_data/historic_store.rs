// =============================================================================
// Historic store — last-fetched historic series per resolution
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use crate::market_data::{Candle, Resolution};
use crate::types::Availability;

/// One historic series and its availability tag.
///
/// Candles are shared behind an `Arc` so that a merge never copies the
/// historic part more than once per rebuild.
#[derive(Debug, Clone)]
pub struct HistoricSeries {
    pub availability: Availability,
    pub candles: Arc<[Candle]>,
}

impl Default for HistoricSeries {
    fn default() -> Self {
        Self {
            availability: Availability::Unresolved,
            candles: Arc::from(Vec::new()),
        }
    }
}

impl HistoricSeries {
    pub fn available(candles: Vec<Candle>) -> Self {
        Self {
            availability: Availability::Available,
            candles: candles.into(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            availability: Availability::Unavailable,
            candles: Arc::from(Vec::new()),
        }
    }

    /// Time of the newest historic candle.
    pub fn watermark(&self) -> Option<i64> {
        self.candles.last().map(|c| c.time)
    }
}

/// Per-symbol map of resolution → historic series.
#[derive(Debug, Clone, Default)]
pub struct HistoricStore {
    series: HashMap<Resolution, HistoricSeries>,
}

impl HistoricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Availability for `resolution`; a never-touched resolution is
    /// `Unresolved`.
    pub fn availability(&self, resolution: Resolution) -> Availability {
        self.series
            .get(&resolution)
            .map_or(Availability::Unresolved, |s| s.availability)
    }

    pub fn get(&self, resolution: Resolution) -> Option<&HistoricSeries> {
        self.series.get(&resolution)
    }

    /// Replace the series for `resolution` wholesale.
    pub fn replace(&mut self, resolution: Resolution, series: HistoricSeries) {
        self.series.insert(resolution, series);
    }

    /// Put every known resolution back to `Unresolved`, dropping its data.
    pub fn reset_all(&mut self) {
        for series in self.series.values_mut() {
            *series = HistoricSeries::default();
        }
    }

    /// Smallest watermark among the `Available` series, if any.
    pub fn min_watermark(&self) -> Option<i64> {
        self.series
            .values()
            .filter(|s| s.availability.is_available())
            .filter_map(HistoricSeries::watermark)
            .min()
    }

    /// Resolutions that have been touched (any state).
    pub fn resolutions(&self) -> impl Iterator<Item = Resolution> + '_ {
        self.series.keys().copied()
    }
}
