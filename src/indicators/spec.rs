// =============================================================================
// Indicator specifications and per-resolution registry
// =============================================================================
//
// An indicator is a closed tagged union decoded from an explicit `type`
// discriminant. The registry only stores specs; values are computed on read
// from the memoized close series.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::indicators::bollinger::{self, calculate_bollinger, BollingerSeries};
use crate::indicators::sma::{self, calculate_sma};
use crate::market_data::Resolution;

/// Indicator parameters, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma { n: usize },
    BollingerBands { f: f64, n: usize, m: usize },
}

/// A registered indicator: parameters, display colour and identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSpec {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: IndicatorKind,
    /// Opaque to the engine; passed through for the presentation layer.
    #[serde(default)]
    pub color: String,
}

/// Computed indicator values, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndicatorOutput {
    Sma { values: Vec<f64> },
    BollingerBands(BollingerSeries),
}

impl IndicatorOutput {
    pub fn len(&self) -> usize {
        match self {
            IndicatorOutput::Sma { values } => values.len(),
            IndicatorOutput::BollingerBands(bands) => bands.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IndicatorSpec {
    pub fn sma(n: usize, color: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: IndicatorKind::Sma { n },
            color: color.into(),
        }
    }

    pub fn bollinger(f: f64, n: usize, m: usize, color: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: IndicatorKind::BollingerBands { f, n, m },
            color: color.into(),
        }
    }

    /// Reject parameters no data could satisfy.
    pub fn validate(&self) -> EngineResult<()> {
        match self.kind {
            IndicatorKind::Sma { n } if n == 0 => {
                Err(EngineError::invalid("SMA window n must be positive"))
            }
            IndicatorKind::BollingerBands { n, m, .. } if n == 0 || m == 0 => Err(
                EngineError::invalid(format!("Bollinger windows must be positive (n={n}, m={m})")),
            ),
            IndicatorKind::BollingerBands { f, .. } if !f.is_finite() => {
                Err(EngineError::invalid(format!("Bollinger factor f={f} is not finite")))
            }
            _ => Ok(()),
        }
    }

    /// Number of input points one output value looks back over.
    pub fn window(&self) -> usize {
        match self.kind {
            IndicatorKind::Sma { n } => n,
            IndicatorKind::BollingerBands { n, m, .. } => bollinger::window(n, m),
        }
    }

    /// Largest `amount` a series of `len` closes can serve.
    pub fn max_amount(&self, len: usize) -> usize {
        sma::max_amount(len, self.window())
    }

    /// Compute the last `amount` values over `closes`.
    pub fn compute(&self, closes: &[f64], amount: usize) -> EngineResult<IndicatorOutput> {
        match self.kind {
            IndicatorKind::Sma { n } => Ok(IndicatorOutput::Sma {
                values: calculate_sma(closes, n, amount)?,
            }),
            IndicatorKind::BollingerBands { f, n, m } => Ok(IndicatorOutput::BollingerBands(
                calculate_bollinger(closes, f, n, m, amount)?,
            )),
        }
    }
}

impl std::fmt::Display for IndicatorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            IndicatorKind::Sma { n } => write!(f, "Simple Moving Average ({n})"),
            IndicatorKind::BollingerBands { f: factor, n, m } => {
                write!(f, "Bollinger Bands ({factor},{n},{m})")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Indicators registered per resolution for one symbol, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct IndicatorRegistry {
    by_resolution: HashMap<Resolution, Vec<IndicatorSpec>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `spec` and return its identity. A spec whose id is already
    /// registered for the resolution replaces the old entry in place.
    pub fn add(&mut self, resolution: Resolution, spec: IndicatorSpec) -> EngineResult<Uuid> {
        spec.validate()?;
        let id = spec.id;
        let list = self.by_resolution.entry(resolution).or_default();
        match list.iter().position(|s| s.id == id) {
            Some(pos) => list[pos] = spec,
            None => list.push(spec),
        }
        Ok(id)
    }

    pub fn remove(&mut self, resolution: Resolution, id: Uuid) -> EngineResult<IndicatorSpec> {
        let list = self
            .by_resolution
            .get_mut(&resolution)
            .ok_or(EngineError::UnknownIndicator(id))?;
        let pos = list
            .iter()
            .position(|s| s.id == id)
            .ok_or(EngineError::UnknownIndicator(id))?;
        Ok(list.remove(pos))
    }

    pub fn get(&self, resolution: Resolution, id: Uuid) -> EngineResult<&IndicatorSpec> {
        self.list(resolution)
            .iter()
            .find(|s| s.id == id)
            .ok_or(EngineError::UnknownIndicator(id))
    }

    pub fn list(&self, resolution: Resolution) -> &[IndicatorSpec] {
        self.by_resolution
            .get(&resolution)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
