// =============================================================================
// Tick buffer — raw live ticks received since the last historic fetch
// =============================================================================

use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::market_data::Tick;

/// Fewest buffered ticks that count as live data. A single tick has no prior
/// price, so below this the merged series is the historic series alone.
pub const MIN_LIVE_TICKS: usize = 2;

/// Per-symbol buffer of live ticks in non-decreasing time order.
///
/// The buffer remembers the newest accepted timestamp even after trimming so
/// that a late tick is still recognised as out of order.
#[derive(Debug, Clone)]
pub struct TickBuffer {
    ticks: Vec<Tick>,
    last_time: Option<i64>,
    max_ticks: usize,
}

impl TickBuffer {
    /// Create a buffer holding at most `max_ticks` ticks; the oldest are
    /// dropped once the cap is reached.
    pub fn new(max_ticks: usize) -> Self {
        Self {
            ticks: Vec::new(),
            last_time: None,
            max_ticks: max_ticks.max(2),
        }
    }

    /// Append a tick. Rejects ticks older than the last accepted one.
    pub fn push(&mut self, tick: Tick) -> EngineResult<()> {
        if let Some(last) = self.last_time {
            if tick.time < last {
                return Err(EngineError::OutOfOrderTick {
                    symbol: tick.symbol,
                    last,
                    got: tick.time,
                });
            }
        }
        self.last_time = Some(tick.time);
        self.ticks.push(tick);

        if self.ticks.len() > self.max_ticks {
            let excess = self.ticks.len() - self.max_ticks;
            warn!(
                symbol = %self.ticks[0].symbol,
                dropped = excess,
                cap = self.max_ticks,
                "tick buffer full, dropping oldest ticks"
            );
            self.ticks.drain(..excess);
        }
        Ok(())
    }

    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Copy of the ticks strictly newer than `watermark`. The buffer itself
    /// is left untouched.
    pub fn newer_than(&self, watermark: i64) -> Vec<Tick> {
        self.ticks
            .iter()
            .filter(|t| t.time > watermark)
            .cloned()
            .collect()
    }

    /// Drop ticks with `time <= watermark`, always keeping at least the
    /// newest [`MIN_LIVE_TICKS`] so that a later merge sees the same live
    /// portion as before the trim. Returns how many were removed.
    pub fn trim_through(&mut self, watermark: i64) -> usize {
        let covered = self.ticks.iter().take_while(|t| t.time <= watermark).count();
        let removable = covered.min(self.ticks.len().saturating_sub(MIN_LIVE_TICKS));
        self.ticks.drain(..removable);
        removable
    }

    /// Forget all ticks, including the ordering watermark.
    pub fn clear(&mut self) {
        self.ticks.clear();
        self.last_time = None;
    }
}

impl Default for TickBuffer {
    fn default() -> Self {
        Self::new(100_000)
    }
}
