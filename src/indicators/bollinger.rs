// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA over n points), an upper band
// (middle + f*σ) and a lower band (middle - f*σ), where σ is the deviation of
// the last m closes around the middle band:
//
//   σ(i, n, m) = sqrt( (1/m) * Σ_{j=0}^{m-1} (data[i - j] - SMA(i, n))^2 )
//
// n and m are independent. Both bands use the same (n, m) ordering: n always
// sizes the SMA, m always sizes the deviation sum. Producing `amount` points
// therefore needs `max(n, m) - 1 + amount` inputs.

use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::indicators::sma::{ensure_available, predecessor, sma_at};

/// Trailing band values, oldest first. All three vectors have equal length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BollingerSeries {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

impl BollingerSeries {
    pub fn len(&self) -> usize {
        self.middle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middle.is_empty()
    }
}

/// Deviation of the last `m` points around `SMA(i, n)`.
fn deviation(data: &[f64], i: usize, n: usize, m: usize) -> f64 {
    let mean = sma_at(data, i, n);
    let sum: f64 = (0..m)
        .map(|j| (predecessor(data, i, j) - mean).powi(2))
        .sum();
    (sum / m as f64).sqrt()
}

/// Number of points the band window spans.
pub fn window(n: usize, m: usize) -> usize {
    n.max(m)
}

/// Calculate the last `amount` Bollinger Band points.
///
/// # Errors
/// - `InvalidParameter` when `n == 0`, `m == 0` or `f` is not finite.
/// - `InsufficientData` when `data.len() < max(n, m) - 1 + amount`.
pub fn calculate_bollinger(
    data: &[f64],
    f: f64,
    n: usize,
    m: usize,
    amount: usize,
) -> EngineResult<BollingerSeries> {
    if n == 0 || m == 0 {
        return Err(EngineError::invalid(format!(
            "Bollinger windows must be positive (n={n}, m={m})"
        )));
    }
    if !f.is_finite() {
        return Err(EngineError::invalid(format!("Bollinger factor f={f} is not finite")));
    }
    ensure_available(data.len(), window(n, m), amount)?;

    let start = data.len() - amount;
    let mut bands = BollingerSeries {
        upper: Vec::with_capacity(amount),
        middle: Vec::with_capacity(amount),
        lower: Vec::with_capacity(amount),
    };
    for i in start..data.len() {
        let middle = sma_at(data, i, n);
        let spread = f * deviation(data, i, n, m);
        bands.upper.push(middle + spread);
        bands.middle.push(middle);
        bands.lower.push(middle - spread);
    }
    Ok(bands)
}
