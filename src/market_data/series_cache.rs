// =============================================================================
// Series cache — memoized historic + live merge per resolution
// =============================================================================
//
// State machine per (symbol, resolution), driven by the historic store:
//
//   historic Unresolved  -> placeholder tagged Unresolved, caller must fetch
//   historic Unavailable -> placeholder tagged Unavailable, merge never runs
//   historic Available   -> cached merged series, rebuilt at most once per
//                           invalidating event (new historic data, new tick,
//                           symbol reset)
//
// Merged series are immutable once built and handed out behind `Arc`, so a
// cache hit is a reference-count bump.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::market_data::bucketer::bucket_ticks;
use crate::market_data::historic_store::{HistoricSeries, HistoricStore};
use crate::market_data::tick_buffer::{TickBuffer, MIN_LIVE_TICKS};
use crate::market_data::{Candle, Resolution};
use crate::types::Availability;

// ---------------------------------------------------------------------------
// MergedSeries
// ---------------------------------------------------------------------------

/// The continuous candle series for one (symbol, resolution) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSeries {
    availability: Availability,
    candles: Arc<[Candle]>,
}

impl MergedSeries {
    /// Empty series carrying a non-`Available` tag.
    pub fn placeholder(availability: Availability) -> Self {
        Self {
            availability,
            candles: Arc::from(Vec::new()),
        }
    }

    fn available(candles: Vec<Candle>) -> Self {
        Self {
            availability: Availability::Available,
            candles: candles.into(),
        }
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Close prices, oldest first.
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Clamp `wanted` to the number of candles present.
    pub fn available_amount(&self, wanted: usize) -> usize {
        wanted.min(self.candles.len())
    }

    /// The newest `amount` candles, or `InsufficientData` when fewer exist.
    pub fn latest(&self, amount: usize) -> EngineResult<&[Candle]> {
        let have = self.candles.len();
        if have < amount {
            return Err(EngineError::InsufficientData { have, need: amount });
        }
        Ok(&self.candles[have - amount..])
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge an `Available` historic series with the live tick buffer.
///
/// Ticks at or before the historic watermark are already represented by the
/// historic candles and are cut on a copy; the buffer is not modified. With
/// fewer than two buffered ticks the result is the historic series alone.
pub fn merge(historic: &HistoricSeries, ticks: &TickBuffer, resolution: Resolution) -> Vec<Candle> {
    let mut merged: Vec<Candle> = historic.candles.to_vec();
    if ticks.len() < MIN_LIVE_TICKS {
        return merged;
    }

    let watermark = historic.watermark().unwrap_or(i64::MIN);
    let remaining = ticks.newer_than(watermark);
    merged.extend(bucket_ticks(&remaining, resolution));
    merged
}

// ---------------------------------------------------------------------------
// SeriesCache
// ---------------------------------------------------------------------------

/// How a cache read was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Served from the memoized series.
    Hit,
    /// The merge ran and its result was cached.
    Rebuilt,
    /// Historic data has not been fetched; the caller should request it.
    NeedsHistoric,
    /// The provider has no data for this resolution.
    Unavailable,
}

/// Result of [`SeriesCache::read`].
#[derive(Debug, Clone)]
pub struct CacheRead {
    pub series: Arc<MergedSeries>,
    pub outcome: ReadOutcome,
}

/// Per-symbol memo of merged series keyed by resolution.
#[derive(Debug, Default)]
pub struct SeriesCache {
    entries: HashMap<Resolution, Arc<MergedSeries>>,
    rebuilds: u64,
}

impl SeriesCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the merged series for `resolution`, rebuilding it when stale.
    pub fn read(
        &mut self,
        resolution: Resolution,
        historic: &HistoricStore,
        ticks: &TickBuffer,
    ) -> CacheRead {
        let series = match historic.get(resolution) {
            Some(s) if s.availability.is_available() => s,
            Some(s) if s.availability == Availability::Unavailable => {
                return CacheRead {
                    series: Arc::new(MergedSeries::placeholder(Availability::Unavailable)),
                    outcome: ReadOutcome::Unavailable,
                };
            }
            _ => {
                return CacheRead {
                    series: Arc::new(MergedSeries::placeholder(Availability::Unresolved)),
                    outcome: ReadOutcome::NeedsHistoric,
                };
            }
        };

        if let Some(cached) = self.entries.get(&resolution) {
            return CacheRead {
                series: Arc::clone(cached),
                outcome: ReadOutcome::Hit,
            };
        }

        let merged = Arc::new(MergedSeries::available(merge(series, ticks, resolution)));
        self.rebuilds += 1;
        debug!(
            resolution = %resolution,
            candles = merged.len(),
            live_ticks = ticks.len(),
            "merged series rebuilt"
        );
        self.entries.insert(resolution, Arc::clone(&merged));
        CacheRead {
            series: merged,
            outcome: ReadOutcome::Rebuilt,
        }
    }

    pub fn invalidate(&mut self, resolution: Resolution) {
        self.entries.remove(&resolution);
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Number of merges performed since creation.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Tick;

    fn close_candle(close: f64, time: i64) -> Candle {
        Candle::new(close, close, close, close, 1.0, time)
    }

    fn buffer(ticks: &[(f64, i64)]) -> TickBuffer {
        let mut buf = TickBuffer::default();
        for &(price, time) in ticks {
            buf.push(Tick::new("X", price, 1.0, time)).unwrap();
        }
        buf
    }

    fn store_with(res: Resolution, candles: Vec<Candle>) -> HistoricStore {
        let mut store = HistoricStore::new();
        store.replace(res, HistoricSeries::available(candles));
        store
    }

    #[test]
    fn merge_appends_live_bucket_after_watermark() {
        let hist = HistoricSeries::available(vec![close_candle(10.0, 0), close_candle(12.0, 60)]);
        let ticks = buffer(&[(13.0, 90), (11.0, 130)]);
        let merged = merge(&hist, &ticks, Resolution::Min1);
        assert_eq!(merged.len(), 3);
        let last = merged[2];
        assert_eq!(last.time, 90);
        assert_eq!(last.open, 13.0);
        assert_eq!(last.close, 11.0);
        // Caller's buffer untouched.
        assert_eq!(ticks.len(), 2);
    }

    #[test]
    fn watermark_cut_is_exact() {
        let hist = HistoricSeries::available(vec![close_candle(10.0, 1_000)]);

        let at_watermark = buffer(&[(5.0, 1_000), (6.0, 1_000)]);
        assert_eq!(merge(&hist, &at_watermark, Resolution::Min1).len(), 1);

        let one_later = buffer(&[(5.0, 1_000), (6.0, 1_001)]);
        let merged = merge(&hist, &one_later, Resolution::Min1);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].time, 1_001);
        assert_eq!(merged[1].open, 6.0);
    }

    #[test]
    fn single_tick_is_not_merged() {
        let hist = HistoricSeries::available(vec![close_candle(10.0, 0)]);
        let ticks = buffer(&[(99.0, 500_000)]);
        assert_eq!(merge(&hist, &ticks, Resolution::Min1), hist.candles.to_vec());
    }

    #[test]
    fn unresolved_historic_needs_fetch() {
        let mut cache = SeriesCache::new();
        let read = cache.read(Resolution::Day, &HistoricStore::new(), &TickBuffer::default());
        assert_eq!(read.outcome, ReadOutcome::NeedsHistoric);
        assert_eq!(read.series.availability(), Availability::Unresolved);
        assert_eq!(cache.rebuild_count(), 0);
    }

    #[test]
    fn unavailable_historic_skips_merge() {
        let mut store = HistoricStore::new();
        store.replace(Resolution::Day, HistoricSeries::unavailable());
        let mut cache = SeriesCache::new();
        let read = cache.read(Resolution::Day, &store, &buffer(&[(1.0, 1), (2.0, 2)]));
        assert_eq!(read.outcome, ReadOutcome::Unavailable);
        assert!(read.series.is_empty());
        assert_eq!(cache.rebuild_count(), 0);
    }

    #[test]
    fn repeated_reads_hit_cache_until_invalidated() {
        let store = store_with(Resolution::Min1, vec![close_candle(1.0, 0)]);
        let ticks = buffer(&[(2.0, 60_000), (3.0, 61_000)]);
        let mut cache = SeriesCache::new();

        let first = cache.read(Resolution::Min1, &store, &ticks);
        assert_eq!(first.outcome, ReadOutcome::Rebuilt);
        for _ in 0..5 {
            let again = cache.read(Resolution::Min1, &store, &ticks);
            assert_eq!(again.outcome, ReadOutcome::Hit);
            assert!(Arc::ptr_eq(&again.series, &first.series));
        }
        assert_eq!(cache.rebuild_count(), 1);

        cache.invalidate(Resolution::Min1);
        let rebuilt = cache.read(Resolution::Min1, &store, &ticks);
        assert_eq!(rebuilt.outcome, ReadOutcome::Rebuilt);
        assert_eq!(*rebuilt.series, *first.series);
        assert_eq!(cache.rebuild_count(), 2);
    }

    #[test]
    fn latest_is_explicit_about_shortfall() {
        let series = MergedSeries::available(vec![close_candle(1.0, 0), close_candle(2.0, 1)]);
        assert_eq!(series.latest(1).unwrap()[0].close, 2.0);
        assert_eq!(
            series.latest(3).unwrap_err(),
            EngineError::InsufficientData { have: 2, need: 3 }
        );
        assert_eq!(series.available_amount(10), 2);
        assert_eq!(series.closes(), vec![1.0, 2.0]);
    }
}
