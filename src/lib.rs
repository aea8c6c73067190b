// =============================================================================
// Candle Engine — live candle aggregation, caching and indicator evaluation
// =============================================================================
//
// Folds live ticks into OHLCV candles, merges them with historic candles per
// (symbol, resolution), memoizes the result until something invalidates it,
// and evaluates SMA / Bollinger Bands and price alarms over it. Collaborators
// feed decoded inputs in and pull events out; nothing here touches the
// network.
// =============================================================================

pub mod alarm;
pub mod engine;
pub mod error;
pub mod events;
pub mod indicators;
pub mod market_data;
pub mod provider;
pub mod runtime_config;
pub mod types;

pub use engine::{Engine, IndicatorRead, PriceView, SeriesRead, SymbolBook};
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventBus};
pub use indicators::{IndicatorKind, IndicatorOutput, IndicatorSpec};
pub use market_data::{Candle, QueryWindow, Resolution, Tick};
pub use runtime_config::EngineConfig;
pub use types::{Availability, SeriesKey};
