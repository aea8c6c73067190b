// =============================================================================
// Resolution policy — bucket width and timestamp arithmetic per resolution
// =============================================================================
//
// Minute resolutions are fixed-width. Day, week and month are calendar-aware
// and computed in UTC, so a month step from Jan 31 lands on the last day of
// February rather than drifting by a fixed number of milliseconds.

use std::str::FromStr;

use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

const MINUTE_MS: i64 = 60_000;

/// Time resolution used to group ticks into candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "60m")]
    Min60,
    #[serde(rename = "day")]
    Day,
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "month")]
    Month,
}

/// Half-open `[from, to)` window in unix millis for a historic request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWindow {
    pub from: i64,
    pub to: i64,
}

impl Resolution {
    /// All resolutions, finest first.
    pub fn all() -> &'static [Resolution] {
        &[
            Resolution::Min1,
            Resolution::Min5,
            Resolution::Min15,
            Resolution::Min30,
            Resolution::Min60,
            Resolution::Day,
            Resolution::Week,
            Resolution::Month,
        ]
    }

    /// Short label, also used as the serde name.
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Min1 => "1m",
            Resolution::Min5 => "5m",
            Resolution::Min15 => "15m",
            Resolution::Min30 => "30m",
            Resolution::Min60 => "60m",
            Resolution::Day => "day",
            Resolution::Week => "week",
            Resolution::Month => "month",
        }
    }

    /// Provider resolution code.
    pub fn code(&self) -> &'static str {
        match self {
            Resolution::Min1 => "1",
            Resolution::Min5 => "5",
            Resolution::Min15 => "15",
            Resolution::Min30 => "30",
            Resolution::Min60 => "60",
            Resolution::Day => "D",
            Resolution::Week => "W",
            Resolution::Month => "M",
        }
    }

    /// Fixed bucket width in minutes, `None` for calendar resolutions.
    pub fn fixed_minutes(&self) -> Option<i64> {
        match self {
            Resolution::Min1 => Some(1),
            Resolution::Min5 => Some(5),
            Resolution::Min15 => Some(15),
            Resolution::Min30 => Some(30),
            Resolution::Min60 => Some(60),
            Resolution::Day | Resolution::Week | Resolution::Month => None,
        }
    }

    /// Shift `start` by `times` buckets (negative moves backwards).
    ///
    /// Saturates at the `i64` range for minute resolutions and at the
    /// representable calendar range otherwise.
    pub fn advance(&self, start: i64, times: i64) -> i64 {
        if let Some(minutes) = self.fixed_minutes() {
            let delta = times.saturating_mul(minutes).saturating_mul(MINUTE_MS);
            return start.saturating_add(delta);
        }

        let saturated = if times >= 0 { i64::MAX } else { i64::MIN };
        let Some(dt) = DateTime::<Utc>::from_timestamp_millis(start) else {
            return saturated;
        };
        let steps = times.unsigned_abs();
        let shifted = match self {
            Resolution::Day => shift_days(dt, steps, times >= 0),
            Resolution::Week => steps
                .checked_mul(7)
                .and_then(|days| shift_days(dt, days, times >= 0)),
            Resolution::Month => u32::try_from(steps).ok().and_then(|m| {
                if times >= 0 {
                    dt.checked_add_months(Months::new(m))
                } else {
                    dt.checked_sub_months(Months::new(m))
                }
            }),
            _ => None,
        };
        shifted.map_or(saturated, |d| d.timestamp_millis())
    }

    /// `true` when `time` falls outside the bucket opened at `bucket_start`.
    pub fn is_new_bucket(&self, bucket_start: i64, time: i64) -> bool {
        time >= self.advance(bucket_start, 1)
    }

    /// Build the `[from, to)` window covering the last `amount` buckets up to
    /// `now`.
    pub fn query_window(&self, amount: usize, now: i64) -> EngineResult<QueryWindow> {
        let times = i64::try_from(amount)
            .map_err(|_| EngineError::invalid(format!("window amount {amount} too large")))?;
        let from = self.advance(now, -times);
        if from == now {
            return Err(EngineError::invalid(format!(
                "zero-length query window for {self} (amount {amount})"
            )));
        }
        Ok(QueryWindow { from, to: now })
    }
}

fn shift_days(dt: DateTime<Utc>, days: u64, forward: bool) -> Option<DateTime<Utc>> {
    if forward {
        dt.checked_add_days(Days::new(days))
    } else {
        dt.checked_sub_days(Days::new(days))
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Day
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Resolution {
    type Err = EngineError;

    /// Accepts either the label (`"5m"`, `"day"`) or the provider code
    /// (`"5"`, `"D"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resolution::all()
            .iter()
            .copied()
            .find(|r| r.label().eq_ignore_ascii_case(s) || r.code() == s)
            .ok_or_else(|| EngineError::invalid(format!("unknown resolution: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
