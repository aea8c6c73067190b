use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV candle. `time` is the bucket start in unix millis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub time: i64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64, time: i64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
            time,
        }
    }

    /// `true` only when the close is strictly above the open. A flat candle
    /// (`open == close`) counts as downward.
    pub fn upward_trend(&self) -> bool {
        self.close > self.open
    }
}

/// A single trade event received from the live stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub time: i64,
}

impl Tick {
    pub fn new(symbol: impl Into<String>, price: f64, volume: f64, time: i64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume,
            time,
        }
    }
}

/// Check that candle times are strictly increasing.
pub fn is_strictly_increasing(candles: &[Candle]) -> bool {
    candles.windows(2).all(|w| w[0].time < w[1].time)
}
