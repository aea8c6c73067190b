// =============================================================================
// Quote and search snapshots — auxiliary per-symbol data with availability
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::Availability;

/// Daily quote for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    /// Current price of the day.
    pub current: f64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub previous_close: f64,
    pub time: i64,
}

/// Symbol lookup result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub description: String,
    pub display_symbol: String,
    pub symbol: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A value paired with its availability tag.
///
/// `value` is `Some` exactly when `availability` is `Available`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    availability: Availability,
    value: Option<T>,
}

impl<T> Tracked<T> {
    pub fn unresolved() -> Self {
        Self {
            availability: Availability::Unresolved,
            value: None,
        }
    }

    /// `Some` → `Available`, `None` → `Unavailable`.
    pub fn resolved(value: Option<T>) -> Self {
        let availability = if value.is_some() {
            Availability::Available
        } else {
            Availability::Unavailable
        };
        Self {
            availability,
            value,
        }
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn reset(&mut self) {
        *self = Self::unresolved();
    }
}

impl<T> Default for Tracked<T> {
    fn default() -> Self {
        Self::unresolved()
    }
}
