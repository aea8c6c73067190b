// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator math over a dense close-price slice
// (oldest -> newest). Every public function returns `EngineResult` so callers
// are forced to handle insufficient-data and parameter errors; nothing is
// silently padded with zeros or truncated.

pub mod bollinger;
pub mod sma;
pub mod spec;

pub use bollinger::{calculate_bollinger, BollingerSeries};
pub use sma::calculate_sma;
pub use spec::{IndicatorKind, IndicatorOutput, IndicatorRegistry, IndicatorSpec};
