// =============================================================================
// Shared types used across the candle engine
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Resolution;

/// Whether a data item has been requested, confirmed absent, or is usable.
///
/// Every historic series, quote, search entry and merged series carries one
/// of these independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Not yet requested or computed; reading it must trigger a fetch.
    Unresolved,
    /// The provider confirmed that no data exists.
    Unavailable,
    /// Usable data is present.
    Available,
}

impl Availability {
    pub fn is_available(self) -> bool {
        self == Self::Available
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::Unresolved
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unresolved => write!(f, "loading..."),
            Self::Unavailable => write!(f, "inaccessible"),
            Self::Available => write!(f, "accessible"),
        }
    }
}

/// Composite key that identifies one candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub resolution: Resolution,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            symbol: symbol.into(),
            resolution,
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unresolved() {
        assert_eq!(Availability::default(), Availability::Unresolved);
        assert!(!Availability::Unavailable.is_available());
        assert!(Availability::Available.is_available());
    }

    #[test]
    fn series_key_display() {
        let key = SeriesKey::new("AAPL", Resolution::Min5);
        assert_eq!(key.to_string(), "AAPL@5m");
    }
}
