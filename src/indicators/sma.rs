// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// SMA(i, n) is the mean of the n closes ending at (and including) index i:
//
//   SMA(i, n) = (1/n) * Σ_{j=0}^{n-1} data[i - j]
//
// Producing `amount` trailing values needs `n - 1 + amount` input points.
// =============================================================================

use crate::error::{EngineError, EngineResult};

/// `data[i - j]`, the j-th predecessor of index `i` (j = 0 is `i` itself).
///
/// Callers guarantee `j <= i`.
#[inline]
pub(crate) fn predecessor(data: &[f64], i: usize, j: usize) -> f64 {
    data[i - j]
}

/// SMA at index `i` over a window of `n` points. Requires `n >= 1` and
/// `i + 1 >= n`.
pub(crate) fn sma_at(data: &[f64], i: usize, n: usize) -> f64 {
    let sum: f64 = (0..n).map(|j| predecessor(data, i, j)).sum();
    sum / n as f64
}

/// Number of input points needed to produce `amount` values with a window of
/// `window` points.
pub fn required_points(window: usize, amount: usize) -> usize {
    window.saturating_sub(1).saturating_add(amount)
}

/// How many trailing values a window of `window` points can produce from
/// `len` inputs.
pub fn max_amount(len: usize, window: usize) -> usize {
    (len + 1).saturating_sub(window.max(1))
}

/// Fail with `InsufficientData` unless `len >= window - 1 + amount`.
pub(crate) fn ensure_available(len: usize, window: usize, amount: usize) -> EngineResult<()> {
    let need = required_points(window, amount);
    if len < need {
        return Err(EngineError::InsufficientData { have: len, need });
    }
    Ok(())
}

/// The last `amount` SMA values of `data` (oldest first) for window `n`.
///
/// # Errors
/// - `InvalidParameter` when `n == 0`.
/// - `InsufficientData` when `data.len() < n - 1 + amount`.
pub fn calculate_sma(data: &[f64], n: usize, amount: usize) -> EngineResult<Vec<f64>> {
    if n == 0 {
        return Err(EngineError::invalid("SMA window n must be positive"));
    }
    ensure_available(data.len(), n, amount)?;

    let start = data.len() - amount;
    Ok((start..data.len()).map(|i| sma_at(data, i, n)).collect())
}
