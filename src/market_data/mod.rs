pub mod bucketer;
pub mod candle;
pub mod historic_store;
pub mod quote;
pub mod resolution;
pub mod series_cache;
pub mod tick_buffer;

// Re-export the core data types for convenient access (e.g. `use crate::market_data::Candle`).
pub use bucketer::{bucket_ticks, resample};
pub use candle::{Candle, Tick};
pub use historic_store::{HistoricSeries, HistoricStore};
pub use quote::{QuoteSnapshot, SearchEntry, Tracked};
pub use resolution::{QueryWindow, Resolution};
pub use series_cache::{merge, CacheRead, MergedSeries, ReadOutcome, SeriesCache};
pub use tick_buffer::TickBuffer;
