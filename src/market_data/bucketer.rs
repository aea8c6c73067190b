// =============================================================================
// Tick bucketer — folds ticks (or finer candles) into OHLCV candles
// =============================================================================
//
// A bucket opens at the time of the first tick that does not fit the previous
// bucket, so live buckets are anchored on trade times rather than on aligned
// clock boundaries. Every output candle satisfies low <= open/close <= high
// and candle times are strictly increasing.

use std::borrow::Cow;

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::market_data::{Candle, Resolution, Tick};

/// In-progress bucket state.
struct Bucket {
    start: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Bucket {
    fn open_at(start: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            start,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    fn fold(&mut self, high: f64, low: f64, close: f64, volume: f64) {
        self.low = self.low.min(low);
        self.high = self.high.max(high);
        self.close = close;
        self.volume += volume;
    }

    fn finish(&self) -> Candle {
        Candle::new(self.open, self.high, self.low, self.close, self.volume, self.start)
    }
}

/// Bucket an ordered tick slice into candles at `resolution`.
///
/// Ticks are expected in non-decreasing time order. An unordered slice is
/// sorted (stably, on a copy) before bucketing. Empty input yields an empty
/// vector.
pub fn bucket_ticks(ticks: &[Tick], resolution: Resolution) -> Vec<Candle> {
    let Some(first) = ticks.first() else {
        return Vec::new();
    };

    let ticks: Cow<'_, [Tick]> = if ticks.windows(2).all(|w| w[0].time <= w[1].time) {
        Cow::Borrowed(ticks)
    } else {
        debug!(symbol = %first.symbol, count = ticks.len(), "sorting unordered ticks before bucketing");
        let mut sorted = ticks.to_vec();
        sorted.sort_by_key(|t| t.time);
        Cow::Owned(sorted)
    };

    let first = &ticks[0];
    let mut bucket = Bucket::open_at(
        first.time,
        first.price,
        first.price,
        first.price,
        first.price,
        first.volume,
    );
    let mut candles = Vec::new();

    for tick in &ticks[1..] {
        if resolution.is_new_bucket(bucket.start, tick.time) {
            candles.push(bucket.finish());
            bucket = Bucket::open_at(
                tick.time,
                tick.price,
                tick.price,
                tick.price,
                tick.price,
                tick.volume,
            );
        } else {
            bucket.fold(tick.price, tick.price, tick.price, tick.volume);
        }
    }

    candles.push(bucket.finish());
    candles
}

/// Fold a candle series into a coarser resolution.
///
/// `to` must not be finer than `from`; asking for that returns
/// `InvalidParameter`. Same-resolution input is returned unchanged.
pub fn resample(candles: &[Candle], from: Resolution, to: Resolution) -> EngineResult<Vec<Candle>> {
    if to < from {
        return Err(EngineError::invalid(format!(
            "cannot resample {from} candles into finer {to}"
        )));
    }
    if to == from {
        return Ok(candles.to_vec());
    }
    let Some(first) = candles.first() else {
        return Ok(Vec::new());
    };

    let mut bucket = Bucket::open_at(
        first.time,
        first.open,
        first.high,
        first.low,
        first.close,
        first.volume,
    );
    let mut out = Vec::new();

    for c in &candles[1..] {
        if to.is_new_bucket(bucket.start, c.time) {
            out.push(bucket.finish());
            bucket = Bucket::open_at(c.time, c.open, c.high, c.low, c.close, c.volume);
        } else {
            bucket.fold(c.high, c.low, c.close, c.volume);
        }
    }

    out.push(bucket.finish());
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
