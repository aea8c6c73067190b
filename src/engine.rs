// =============================================================================
// Candle Engine — per-symbol state, merge orchestration and event fan-out
// =============================================================================
//
// The single entry point for collaborators. State is partitioned by symbol:
// each symbol owns a `SymbolBook` behind its own mutex, and the outer map is
// only write-locked when a symbol is first touched or removed. Operations on
// different symbols never contend on the same book lock.
//
// Thread safety:
//   - parking_lot::RwLock for the symbol map (read-mostly).
//   - parking_lot::Mutex per symbol; every mutation of one symbol is
//     serialized through it.
//   - Events are published while the book is still locked, so the events of
//     one symbol follow the order of its state changes. Publishing never
//     blocks.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alarm::AlarmSet;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::indicators::{IndicatorOutput, IndicatorRegistry, IndicatorSpec};
use crate::market_data::candle::is_strictly_increasing;
use crate::market_data::{
    Candle, HistoricSeries, HistoricStore, MergedSeries, QuoteSnapshot, ReadOutcome, Resolution,
    SearchEntry, SeriesCache, Tick, TickBuffer, Tracked,
};
use crate::provider::{switch_provider, DataProviderProfile, ProviderSwitch};
use crate::runtime_config::EngineConfig;
use crate::types::Availability;

// =============================================================================
// Read results
// =============================================================================

/// Result of [`Engine::read_series`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRead {
    pub availability: Availability,
    /// The newest `amount` candles. Empty unless `availability` is
    /// `Available`.
    pub candles: Vec<Candle>,
}

/// Result of an indicator read. `output` is `None` while the underlying
/// series is not `Available`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorRead {
    pub availability: Availability,
    pub output: Option<IndicatorOutput>,
}

/// Price figures derived from live ticks, falling back to the daily quote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PriceView {
    pub current: Option<f64>,
    pub previous: Option<f64>,
}

impl PriceView {
    pub fn diff(&self) -> Option<f64> {
        Some(self.current? - self.previous?)
    }
}

// =============================================================================
// SymbolBook
// =============================================================================

/// Everything the engine knows about one symbol.
#[derive(Debug)]
pub struct SymbolBook {
    symbol: String,
    generation: u64,
    historic: HistoricStore,
    ticks: TickBuffer,
    cache: SeriesCache,
    indicators: IndicatorRegistry,
    alarms: AlarmSet,
    quote: Tracked<QuoteSnapshot>,
    search: Tracked<SearchEntry>,
    last_price: Option<f64>,
    prior_price: Option<f64>,
    /// Resolutions with an outstanding historic request in this generation.
    requested: HashSet<Resolution>,
}

impl SymbolBook {
    fn new(symbol: &str, max_ticks: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            generation: 0,
            historic: HistoricStore::new(),
            ticks: TickBuffer::new(max_ticks),
            cache: SeriesCache::new(),
            indicators: IndicatorRegistry::new(),
            alarms: AlarmSet::new(),
            quote: Tracked::unresolved(),
            search: Tracked::unresolved(),
            last_price: None,
            prior_price: None,
            requested: HashSet::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn historic_availability(&self, resolution: Resolution) -> Availability {
        self.historic.availability(resolution)
    }

    pub fn buffered_ticks(&self) -> usize {
        self.ticks.len()
    }

    pub fn rebuild_count(&self) -> u64 {
        self.cache.rebuild_count()
    }

    /// Back to `Unresolved` everywhere. Alarms and indicators are user
    /// configuration and survive.
    fn reset(&mut self) {
        self.generation += 1;
        self.historic.reset_all();
        self.ticks.clear();
        self.cache.invalidate_all();
        self.quote.reset();
        self.search.reset();
        self.last_price = None;
        self.prior_price = None;
        self.requested.clear();
    }

    fn historic_needed(&mut self, resolution: Resolution, history_candles: usize) -> EngineEvent {
        self.requested.insert(resolution);
        let window = match resolution.query_window(history_candles, Utc::now().timestamp_millis()) {
            Ok(window) => Some(window),
            Err(e) => {
                warn!(
                    symbol = %self.symbol,
                    resolution = %resolution,
                    error = %e,
                    "historic request sent without a query window"
                );
                None
            }
        };
        EngineEvent::HistoricNeeded {
            symbol: self.symbol.clone(),
            resolution,
            window,
            generation: self.generation,
        }
    }

    /// Install a historic response. With `expected` set, the response is
    /// dropped unless it belongs to the current generation; the check and the
    /// install happen under the same lock.
    fn apply_historic(
        &mut self,
        resolution: Resolution,
        series: HistoricSeries,
        expected: Option<u64>,
    ) -> bool {
        if let Some(generation) = expected {
            if generation != self.generation {
                warn!(
                    symbol = %self.symbol,
                    resolution = %resolution,
                    generation,
                    current = self.generation,
                    "stale historic response dropped"
                );
                return false;
            }
        }
        debug!(
            symbol = %self.symbol,
            resolution = %resolution,
            availability = %series.availability,
            candles = series.candles.len(),
            "historic data applied"
        );
        self.historic.replace(resolution, series);
        self.cache.invalidate(resolution);
        self.requested.remove(&resolution);
        true
    }

    fn price_view(&self) -> PriceView {
        let quote = self.quote.value();
        PriceView {
            current: self.last_price.or(quote.map(|q| q.current)),
            previous: self.prior_price.or(quote.map(|q| q.previous_close)),
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Shared engine handle; wrap in `Arc` to use from several tasks.
pub struct Engine {
    books: RwLock<HashMap<String, Arc<Mutex<SymbolBook>>>>,
    events: EventBus,
    history_candles: usize,
    max_buffered_ticks: usize,
}

impl Engine {
    /// Build an engine from `config`, registering its symbols and alarms.
    pub fn new(config: &EngineConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!(error = %e, "engine config failed validation");
        }
        let engine = Self {
            books: RwLock::new(HashMap::new()),
            events: EventBus::new(config.event_capacity),
            history_candles: config.history_candles,
            max_buffered_ticks: config.max_buffered_ticks,
        };

        for symbol in &config.symbols {
            engine.get_or_init(symbol);
        }
        for (symbol, thresholds) in &config.alarms {
            let (book, _) = engine.get_or_init(symbol);
            let mut book = book.lock();
            for &threshold in thresholds {
                if let Err(e) = book.alarms.add(threshold) {
                    warn!(symbol = %symbol, threshold, error = %e, "configured alarm rejected");
                }
            }
        }

        info!(
            symbols = engine.books.read().len(),
            history_candles = engine.history_candles,
            "candle engine initialised"
        );
        engine
    }

    /// Receiver for every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn events_published(&self) -> u64 {
        self.events.published()
    }

    // -------------------------------------------------------------------------
    // Symbol registry
    // -------------------------------------------------------------------------

    /// Fetch the book for `symbol`, creating it when absent. The flag is
    /// `true` when this call created it.
    pub fn get_or_init(&self, symbol: &str) -> (Arc<Mutex<SymbolBook>>, bool) {
        if let Some(book) = self.books.read().get(symbol) {
            return (Arc::clone(book), false);
        }

        let mut books = self.books.write();
        // Another caller may have created it between the two locks.
        if let Some(book) = books.get(symbol) {
            return (Arc::clone(book), false);
        }
        let book = Arc::new(Mutex::new(SymbolBook::new(symbol, self.max_buffered_ticks)));
        books.insert(symbol.to_string(), Arc::clone(&book));
        debug!(symbol = %symbol, "symbol registered");
        (book, true)
    }

    fn book(&self, symbol: &str) -> Option<Arc<Mutex<SymbolBook>>> {
        self.books.read().get(symbol).cloned()
    }

    /// Run `f` with the book of `symbol` locked, if the symbol is known.
    fn with_book<R>(&self, symbol: &str, f: impl FnOnce(&mut SymbolBook) -> R) -> Option<R> {
        let book = self.book(symbol)?;
        let mut guard = book.lock();
        Some(f(&mut guard))
    }

    /// Register `symbol`. Returns `false` when it was already known.
    pub fn add_symbol(&self, symbol: &str) -> bool {
        self.get_or_init(symbol).1
    }

    /// Drop all state for `symbol` and ask the transport to unsubscribe.
    pub fn remove_symbol(&self, symbol: &str) -> bool {
        let removed = self.books.write().remove(symbol).is_some();
        if removed {
            info!(symbol = %symbol, "symbol removed");
            self.events.publish(EngineEvent::UnsubscribeRequested {
                symbol: symbol.to_string(),
            });
        }
        removed
    }

    /// Registered symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.books.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Current generation of `symbol`; bumped on every reset.
    pub fn generation(&self, symbol: &str) -> u64 {
        self.with_book(symbol, |b| b.generation).unwrap_or(0)
    }

    /// `true` when a response tagged with `generation` still applies.
    pub fn is_current(&self, symbol: &str, generation: u64) -> bool {
        self.generation(symbol) == generation
    }

    /// Run `f` against the book of `symbol`, if it exists.
    pub fn inspect<R>(&self, symbol: &str, f: impl FnOnce(&SymbolBook) -> R) -> Option<R> {
        self.with_book(symbol, |b| f(b))
    }

    // -------------------------------------------------------------------------
    // Inputs
    // -------------------------------------------------------------------------

    /// Apply a historic response. `ok == false`, or `ok` with no candles,
    /// marks the resolution `Unavailable`.
    pub fn submit_historic(
        &self,
        symbol: &str,
        resolution: Resolution,
        candles: Vec<Candle>,
        ok: bool,
    ) -> EngineResult<()> {
        self.install_historic(symbol, resolution, None, candles, ok)?;
        Ok(())
    }

    /// Apply a historic response only if it was requested for the current
    /// generation. Returns `false` when the response was stale and dropped.
    pub fn submit_historic_for(
        &self,
        symbol: &str,
        resolution: Resolution,
        generation: u64,
        candles: Vec<Candle>,
        ok: bool,
    ) -> EngineResult<bool> {
        self.install_historic(symbol, resolution, Some(generation), candles, ok)
    }

    fn install_historic(
        &self,
        symbol: &str,
        resolution: Resolution,
        expected: Option<u64>,
        candles: Vec<Candle>,
        ok: bool,
    ) -> EngineResult<bool> {
        if ok && !is_strictly_increasing(&candles) {
            warn!(
                symbol = %symbol,
                resolution = %resolution,
                candles = candles.len(),
                "historic payload rejected: times not strictly increasing"
            );
            return Err(EngineError::invalid(format!(
                "historic candles for {symbol}@{resolution} are not strictly increasing in time"
            )));
        }

        let series = if ok && !candles.is_empty() {
            HistoricSeries::available(candles)
        } else {
            HistoricSeries::unavailable()
        };

        let (book, _) = self.get_or_init(symbol);
        let mut book = book.lock();
        let applied = book.apply_historic(resolution, series, expected);
        if applied {
            self.events.publish(EngineEvent::SeriesUpdated {
                symbol: symbol.to_string(),
                resolution,
            });
        }
        Ok(applied)
    }

    /// Ingest a live tick. Returns the alarm threshold it triggered, if any.
    pub fn submit_tick(
        &self,
        symbol: &str,
        price: f64,
        volume: f64,
        time: i64,
    ) -> EngineResult<Option<f64>> {
        if !price.is_finite() || !volume.is_finite() {
            warn!(symbol = %symbol, price, volume, "tick rejected: non-finite value");
            return Err(EngineError::invalid(format!(
                "tick for {symbol} has non-finite price or volume"
            )));
        }

        let (book, _) = self.get_or_init(symbol);
        let mut events = Vec::with_capacity(4);
        let triggered = {
            let mut book = book.lock();
            if let Err(e) = book.ticks.push(Tick::new(symbol, price, volume, time)) {
                warn!(symbol = %symbol, time, error = %e, "tick rejected");
                return Err(e);
            }

            let prior = book.last_price;
            book.prior_price = prior;
            book.last_price = Some(price);
            book.cache.invalidate_all();

            for resolution in book.historic.resolutions() {
                if book.historic.availability(resolution).is_available() {
                    events.push(EngineEvent::SeriesUpdated {
                        symbol: symbol.to_string(),
                        resolution,
                    });
                }
            }

            let previous = prior.or_else(|| book.quote.value().map(|q| q.current));
            let triggered = previous.and_then(|prev| book.alarms.evaluate(price, prev));
            if let Some(threshold) = triggered {
                info!(symbol = %symbol, threshold, price, "alarm triggered");
                events.push(EngineEvent::AlarmTriggered {
                    symbol: symbol.to_string(),
                    threshold,
                });
            }
            debug!(symbol = %symbol, price, volume, time, buffered = book.ticks.len(), "tick");

            events.push(EngineEvent::SymbolUpdated {
                symbol: symbol.to_string(),
            });
            self.events.publish_all(events);
            triggered
        };
        Ok(triggered)
    }

    /// Apply a quote response; `None` marks the quote `Unavailable`.
    pub fn submit_quote(&self, symbol: &str, quote: Option<QuoteSnapshot>) {
        let (book, _) = self.get_or_init(symbol);
        let mut book = book.lock();
        book.quote = Tracked::resolved(quote);
        self.events.publish(EngineEvent::SymbolUpdated {
            symbol: symbol.to_string(),
        });
    }

    /// Apply a search response; `None` marks the entry `Unavailable`.
    pub fn submit_search(&self, symbol: &str, entry: Option<SearchEntry>) {
        let (book, _) = self.get_or_init(symbol);
        let mut book = book.lock();
        book.search = Tracked::resolved(entry);
        self.events.publish(EngineEvent::SymbolUpdated {
            symbol: symbol.to_string(),
        });
    }

    /// Return `symbol` to `Unresolved`: ticks, historic data, quote and
    /// search are dropped and the generation advances.
    pub fn reset_symbol(&self, symbol: &str) {
        let (book, _) = self.get_or_init(symbol);
        let mut book = book.lock();
        book.reset();
        info!(symbol = %symbol, generation = book.generation, "symbol reset");
        self.events.publish(EngineEvent::SymbolUpdated {
            symbol: symbol.to_string(),
        });
    }

    /// Apply the resets computed by [`switch_provider`].
    pub fn apply_provider_switch(&self, switch: &ProviderSwitch) {
        for symbol in &switch.resets {
            self.reset_symbol(symbol);
        }
    }

    /// Move from `old` to `new`, resetting every registered symbol unless the
    /// profile is unchanged.
    pub fn switch_provider(
        &self,
        old: Option<&DataProviderProfile>,
        new: &DataProviderProfile,
    ) -> ProviderSwitch {
        if !new.is_valid() {
            warn!(provider = %new.name, "switching to a provider profile with blank fields");
        }
        let switch = switch_provider(old, new, &self.symbols());
        info!(
            from = old.map(|p| p.name.as_str()).unwrap_or("<none>"),
            to = %new.name,
            resets = switch.resets.len(),
            "provider switch"
        );
        self.apply_provider_switch(&switch);
        switch
    }

    /// Ask collaborators for everything still `Unresolved` for `symbol`,
    /// then request a live subscription.
    pub fn request_missing(&self, symbol: &str, resolution: Resolution) {
        let (book, _) = self.get_or_init(symbol);
        let mut book = book.lock();
        let mut events = Vec::new();
        if book.search.availability() == Availability::Unresolved {
            events.push(EngineEvent::SearchNeeded {
                symbol: symbol.to_string(),
            });
        }
        if book.historic.availability(resolution) == Availability::Unresolved {
            events.push(book.historic_needed(resolution, self.history_candles));
        }
        if book.quote.availability() == Availability::Unresolved {
            events.push(EngineEvent::QuoteNeeded {
                symbol: symbol.to_string(),
            });
        }
        events.push(EngineEvent::SubscribeRequested {
            symbol: symbol.to_string(),
        });
        self.events.publish_all(events);
    }

    // -------------------------------------------------------------------------
    // Alarms
    // -------------------------------------------------------------------------

    /// Returns `Ok(false)` when the threshold is already set.
    pub fn add_alarm(&self, symbol: &str, threshold: f64) -> EngineResult<bool> {
        let (book, _) = self.get_or_init(symbol);
        let added = book.lock().alarms.add(threshold)?;
        if added {
            debug!(symbol = %symbol, threshold, "alarm added");
        }
        Ok(added)
    }

    pub fn remove_alarm(&self, symbol: &str, threshold: f64) -> bool {
        self.with_book(symbol, |b| b.alarms.remove(threshold))
            .unwrap_or(false)
    }

    pub fn alarms(&self, symbol: &str) -> Vec<f64> {
        self.with_book(symbol, |b| b.alarms.thresholds().to_vec())
            .unwrap_or_default()
    }

    pub fn clear_alarms(&self, symbol: &str) {
        self.with_book(symbol, |b| b.alarms.clear());
    }

    pub fn clear_all_alarms(&self) {
        let books: Vec<_> = self.books.read().values().cloned().collect();
        for book in books {
            book.lock().alarms.clear();
        }
    }

    // -------------------------------------------------------------------------
    // Indicators
    // -------------------------------------------------------------------------

    pub fn add_indicator(
        &self,
        symbol: &str,
        resolution: Resolution,
        spec: IndicatorSpec,
    ) -> EngineResult<Uuid> {
        let (book, _) = self.get_or_init(symbol);
        let id = book.lock().indicators.add(resolution, spec)?;
        debug!(symbol = %symbol, resolution = %resolution, id = %id, "indicator added");
        Ok(id)
    }

    pub fn remove_indicator(
        &self,
        symbol: &str,
        resolution: Resolution,
        id: Uuid,
    ) -> EngineResult<IndicatorSpec> {
        self.with_book(symbol, |b| b.indicators.remove(resolution, id))
            .unwrap_or(Err(EngineError::UnknownIndicator(id)))
    }

    pub fn indicators(&self, symbol: &str, resolution: Resolution) -> Vec<IndicatorSpec> {
        self.with_book(symbol, |b| b.indicators.list(resolution).to_vec())
            .unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// The full merged series for a pair.
    ///
    /// An `Unresolved` pair triggers one `HistoricNeeded` per generation;
    /// a rebuild trims live ticks already covered by every available
    /// historic series.
    pub fn series(&self, symbol: &str, resolution: Resolution) -> Arc<MergedSeries> {
        let (book, _) = self.get_or_init(symbol);
        let mut guard = book.lock();
        let book = &mut *guard;
        let read = book.cache.read(resolution, &book.historic, &book.ticks);
        match read.outcome {
            ReadOutcome::NeedsHistoric if !book.requested.contains(&resolution) => {
                debug!(symbol = %symbol, resolution = %resolution, "historic data requested");
                let event = book.historic_needed(resolution, self.history_candles);
                self.events.publish(event);
            }
            ReadOutcome::Rebuilt => {
                if let Some(watermark) = book.historic.min_watermark() {
                    let trimmed = book.ticks.trim_through(watermark);
                    if trimmed > 0 {
                        debug!(symbol = %symbol, trimmed, watermark, "covered ticks trimmed");
                    }
                }
            }
            _ => {}
        }
        read.series
    }

    /// The newest `amount` candles of a pair.
    ///
    /// Fails with `InsufficientData` only when the series is `Available` but
    /// shorter than `amount`.
    pub fn read_series(
        &self,
        symbol: &str,
        resolution: Resolution,
        amount: usize,
    ) -> EngineResult<SeriesRead> {
        let series = self.series(symbol, resolution);
        let candles = if series.availability().is_available() {
            series.latest(amount)?.to_vec()
        } else {
            Vec::new()
        };
        Ok(SeriesRead {
            availability: series.availability(),
            candles,
        })
    }

    /// Evaluate `spec` over the close prices of a pair.
    pub fn read_indicator(
        &self,
        symbol: &str,
        resolution: Resolution,
        spec: &IndicatorSpec,
        amount: usize,
    ) -> EngineResult<IndicatorRead> {
        let series = self.series(symbol, resolution);
        let availability = series.availability();
        if !availability.is_available() {
            return Ok(IndicatorRead {
                availability,
                output: None,
            });
        }
        let output = spec.compute(&series.closes(), amount)?;
        Ok(IndicatorRead {
            availability,
            output: Some(output),
        })
    }

    /// Evaluate a registered indicator.
    pub fn read_indicator_by_id(
        &self,
        symbol: &str,
        resolution: Resolution,
        id: Uuid,
        amount: usize,
    ) -> EngineResult<IndicatorRead> {
        let spec = self
            .with_book(symbol, |b| b.indicators.get(resolution, id).cloned())
            .unwrap_or(Err(EngineError::UnknownIndicator(id)))?;
        self.read_indicator(symbol, resolution, &spec, amount)
    }

    /// Evaluate every registered indicator of a pair over its maximum
    /// available amount.
    pub fn read_indicators(
        &self,
        symbol: &str,
        resolution: Resolution,
    ) -> Vec<(IndicatorSpec, EngineResult<IndicatorRead>)> {
        let specs = self.indicators(symbol, resolution);
        if specs.is_empty() {
            return Vec::new();
        }
        let len = self.series(symbol, resolution).len();
        specs
            .into_iter()
            .map(|spec| {
                let amount = spec.max_amount(len);
                let read = self.read_indicator(symbol, resolution, &spec, amount);
                (spec, read)
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Quote and price views
    // -------------------------------------------------------------------------

    pub fn quote(&self, symbol: &str) -> Tracked<QuoteSnapshot> {
        self.with_book(symbol, |b| b.quote.clone())
            .unwrap_or_default()
    }

    pub fn search(&self, symbol: &str) -> Tracked<SearchEntry> {
        self.with_book(symbol, |b| b.search.clone())
            .unwrap_or_default()
    }

    pub fn prices(&self, symbol: &str) -> PriceView {
        self.with_book(symbol, |b| b.price_view())
            .unwrap_or_default()
    }

    pub fn current_price(&self, symbol: &str) -> Option<f64> {
        self.prices(symbol).current
    }

    pub fn previous_price(&self, symbol: &str) -> Option<f64> {
        self.prices(symbol).previous
    }

    pub fn price_diff(&self, symbol: &str) -> Option<f64> {
        self.prices(symbol).diff()
    }

    /// Latest price measured against the quote's current-of-day price, in
    /// percent. `0.0` when that price is zero; `None` without a quote.
    pub fn change_percentage(&self, symbol: &str) -> Option<f64> {
        let base = self.quote(symbol).value()?.current;
        if base == 0.0 {
            return Some(0.0);
        }
        let current = self.current_price(symbol)?;
        Some((current - base) / base * 100.0)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn close_candle(close: f64, time: i64) -> Candle {
        Candle::new(close, close, close, close, 1.0, time)
    }

    fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn quote(current: f64, previous_close: f64) -> QuoteSnapshot {
        QuoteSnapshot {
            current,
            high: current,
            low: current,
            open: current,
            previous_close,
            time: 0,
        }
    }

    #[test]
    fn get_or_init_reports_creation_once() {
        let engine = Engine::default();
        let (_, created) = engine.get_or_init("AAPL");
        assert!(created);
        let (_, created) = engine.get_or_init("AAPL");
        assert!(!created);
        assert_eq!(engine.symbols(), vec!["AAPL"]);
    }

    #[test]
    fn unknown_pair_reads_unresolved_and_requests_once() {
        let engine = Engine::default();
        let mut rx = engine.subscribe();

        let read = engine.read_series("AAPL", Resolution::Day, 10).unwrap();
        assert_eq!(read.availability, Availability::Unresolved);
        assert!(read.candles.is_empty());
        engine.read_series("AAPL", Resolution::Day, 10).unwrap();

        let needed: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::HistoricNeeded { .. }))
            .collect();
        assert_eq!(needed.len(), 1);
        match &needed[0] {
            EngineEvent::HistoricNeeded {
                window, generation, ..
            } => {
                assert!(window.is_some());
                assert_eq!(*generation, 0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unavailable_historic_is_terminal_until_reset() {
        let engine = Engine::default();
        engine
            .submit_historic("X", Resolution::Min1, Vec::new(), false)
            .unwrap();
        engine.submit_tick("X", 1.0, 1.0, 10).unwrap();
        engine.submit_tick("X", 2.0, 1.0, 20).unwrap();

        let read = engine.read_series("X", Resolution::Min1, 0).unwrap();
        assert_eq!(read.availability, Availability::Unavailable);
        assert_eq!(engine.inspect("X", |b| b.rebuild_count()), Some(0));

        engine.reset_symbol("X");
        let read = engine.read_series("X", Resolution::Min1, 0).unwrap();
        assert_eq!(read.availability, Availability::Unresolved);
    }

    #[test]
    fn empty_ok_payload_is_unavailable() {
        let engine = Engine::default();
        engine
            .submit_historic("X", Resolution::Day, Vec::new(), true)
            .unwrap();
        let read = engine.read_series("X", Resolution::Day, 0).unwrap();
        assert_eq!(read.availability, Availability::Unavailable);
    }

    #[test]
    fn unordered_historic_payload_leaves_state_unchanged() {
        let engine = Engine::default();
        let bad = vec![close_candle(1.0, 60), close_candle(2.0, 0)];
        let err = engine
            .submit_historic("X", Resolution::Min1, bad, true)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
        assert_eq!(
            engine.inspect("X", |b| b.historic_availability(Resolution::Min1)),
            None
        );
    }

    #[test]
    fn reads_between_ticks_reuse_the_cached_series() {
        let engine = Engine::default();
        engine
            .submit_historic("X", Resolution::Min1, vec![close_candle(1.0, 0)], true)
            .unwrap();

        let a = engine.series("X", Resolution::Min1);
        let b = engine.series("X", Resolution::Min1);
        assert!(Arc::ptr_eq(&a, &b));

        engine.submit_tick("X", 2.0, 1.0, 60_000).unwrap();
        let c = engine.series("X", Resolution::Min1);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(engine.inspect("X", |b| b.rebuild_count()), Some(2));
    }

    #[test]
    fn read_series_is_explicit_about_shortfall() {
        let engine = Engine::default();
        engine
            .submit_historic("X", Resolution::Day, vec![close_candle(1.0, 0)], true)
            .unwrap();
        assert_eq!(
            engine.read_series("X", Resolution::Day, 2).unwrap_err(),
            EngineError::InsufficientData { have: 1, need: 2 }
        );
    }

    #[test]
    fn rebuild_trims_covered_ticks_without_changing_the_result() {
        let engine = Engine::default();
        for (i, t) in [10, 20, 30, 40].into_iter().enumerate() {
            engine.submit_tick("X", i as f64, 1.0, t).unwrap();
        }
        engine
            .submit_historic("X", Resolution::Min1, vec![close_candle(1.0, 25)], true)
            .unwrap();

        let first = engine.series("X", Resolution::Min1);
        assert_eq!(engine.inspect("X", |b| b.buffered_ticks()), Some(2));

        engine
            .submit_historic("X", Resolution::Min1, vec![close_candle(1.0, 25)], true)
            .unwrap();
        let second = engine.series("X", Resolution::Min1);
        assert_eq!(*first, *second);
    }

    #[test]
    fn out_of_order_tick_is_rejected() {
        let engine = Engine::default();
        engine.submit_tick("X", 1.0, 1.0, 100).unwrap();
        let err = engine.submit_tick("X", 1.0, 1.0, 50).unwrap_err();
        assert!(matches!(err, EngineError::OutOfOrderTick { .. }));
        assert_eq!(engine.current_price("X"), Some(1.0));
    }

    #[test]
    fn first_tick_uses_quote_as_previous_price() {
        let engine = Engine::default();
        engine.submit_quote("X", Some(quote(98.0, 95.0)));
        engine.add_alarm("X", 100.0).unwrap();
        assert_eq!(engine.submit_tick("X", 101.0, 1.0, 1).unwrap(), Some(100.0));
        assert!(engine.alarms("X").is_empty());
    }

    #[test]
    fn first_tick_without_quote_only_seeds() {
        let engine = Engine::default();
        engine.add_alarm("X", 100.0).unwrap();
        assert_eq!(engine.submit_tick("X", 101.0, 1.0, 1).unwrap(), None);
        assert_eq!(engine.alarms("X"), vec![100.0]);
    }

    #[test]
    fn alarm_management() {
        let engine = Engine::default();
        assert!(engine.add_alarm("X", 10.0).unwrap());
        assert!(!engine.add_alarm("X", 10.0).unwrap());
        assert!(engine.add_alarm("Y", 20.0).unwrap());
        assert!(engine.remove_alarm("X", 10.0));
        assert!(!engine.remove_alarm("X", 10.0));
        assert!(!engine.remove_alarm("UNKNOWN", 1.0));

        engine.add_alarm("X", 11.0).unwrap();
        engine.clear_alarms("X");
        assert!(engine.alarms("X").is_empty());
        assert_eq!(engine.alarms("Y"), vec![20.0]);
        engine.clear_all_alarms();
        assert!(engine.alarms("Y").is_empty());
    }

    #[test]
    fn reset_bumps_generation_and_drops_stale_responses() {
        let engine = Engine::default();
        engine.get_or_init("X");
        let before = engine.generation("X");
        engine.reset_symbol("X");
        assert!(!engine.is_current("X", before));

        let applied = engine
            .submit_historic_for("X", Resolution::Day, before, vec![close_candle(1.0, 0)], true)
            .unwrap();
        assert!(!applied);
        assert_eq!(
            engine.read_series("X", Resolution::Day, 0).unwrap().availability,
            Availability::Unresolved
        );

        let applied = engine
            .submit_historic_for(
                "X",
                Resolution::Day,
                engine.generation("X"),
                vec![close_candle(1.0, 0)],
                true,
            )
            .unwrap();
        assert!(applied);
    }

    #[test]
    fn reset_between_request_and_response_drops_the_response() {
        let engine = Engine::default();
        let mut rx = engine.subscribe();
        engine.read_series("X", Resolution::Min1, 0).unwrap();
        let requested = match rx.try_recv().unwrap() {
            EngineEvent::HistoricNeeded { generation, .. } => generation,
            other => panic!("unexpected event {other:?}"),
        };

        engine.reset_symbol("X");
        drain(&mut rx);

        let applied = engine
            .submit_historic_for("X", Resolution::Min1, requested, vec![close_candle(1.0, 0)], true)
            .unwrap();
        assert!(!applied);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(
            engine.inspect("X", |b| b.historic_availability(Resolution::Min1)),
            Some(Availability::Unresolved)
        );
    }

    #[test]
    fn generation_check_and_install_share_one_lock() {
        let mut book = SymbolBook::new("X", 16);
        let stale = book.generation();
        book.reset();
        let series = HistoricSeries::available(vec![close_candle(1.0, 0)]);
        assert!(!book.apply_historic(Resolution::Day, series.clone(), Some(stale)));
        assert_eq!(book.historic_availability(Resolution::Day), Availability::Unresolved);
        assert!(book.apply_historic(Resolution::Day, series, Some(book.generation())));
        assert_eq!(book.historic_availability(Resolution::Day), Availability::Available);
    }

    #[test]
    fn stale_responses_never_survive_a_concurrent_reset() {
        for _ in 0..50 {
            let engine = Engine::default();
            engine.get_or_init("X");
            std::thread::scope(|s| {
                s.spawn(|| {
                    for _ in 0..200 {
                        engine
                            .submit_historic_for(
                                "X",
                                Resolution::Day,
                                0,
                                vec![close_candle(1.0, 0)],
                                true,
                            )
                            .unwrap();
                    }
                });
                s.spawn(|| {
                    std::thread::yield_now();
                    engine.reset_symbol("X");
                });
            });
            assert_eq!(engine.generation("X"), 1);
            assert_eq!(
                engine.inspect("X", |b| b.historic_availability(Resolution::Day)),
                Some(Availability::Unresolved)
            );
        }
    }

    #[test]
    fn zero_history_window_still_requests_without_a_window() {
        let mut config = EngineConfig::default();
        config.history_candles = 0;
        let engine = Engine::new(&config);
        let mut rx = engine.subscribe();
        engine.read_series("X", Resolution::Day, 0).unwrap();
        match rx.try_recv().unwrap() {
            EngineEvent::HistoricNeeded { window, .. } => assert!(window.is_none()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn same_symbol_events_follow_state_order() {
        let mut config = EngineConfig::default();
        config.event_capacity = 8192;
        let engine = Engine::new(&config);
        engine
            .submit_historic("X", Resolution::Min1, vec![close_candle(1.0, 0)], true)
            .unwrap();
        let mut rx = engine.subscribe();

        std::thread::scope(|s| {
            for price in [1.0, 2.0] {
                let engine = &engine;
                s.spawn(move || {
                    for _ in 0..500 {
                        engine.submit_tick("X", price, 1.0, 1_000).unwrap();
                    }
                });
            }
        });

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2_000);
        for pair in events.chunks(2) {
            assert!(matches!(pair[0], EngineEvent::SeriesUpdated { .. }));
            assert!(matches!(pair[1], EngineEvent::SymbolUpdated { .. }));
        }
    }

    #[test]
    fn reset_keeps_alarms_and_indicators() {
        let engine = Engine::default();
        engine.add_alarm("X", 5.0).unwrap();
        engine
            .add_indicator("X", Resolution::Day, IndicatorSpec::sma(3, ""))
            .unwrap();
        engine.submit_quote("X", Some(quote(1.0, 1.0)));
        engine.reset_symbol("X");
        assert_eq!(engine.alarms("X"), vec![5.0]);
        assert_eq!(engine.indicators("X", Resolution::Day).len(), 1);
        assert_eq!(engine.quote("X").availability(), Availability::Unresolved);
    }

    #[test]
    fn indicator_reads_follow_series_availability() {
        let engine = Engine::default();
        let spec = IndicatorSpec::sma(3, "#fff");
        let id = engine.add_indicator("X", Resolution::Day, spec.clone()).unwrap();

        let pending = engine
            .read_indicator_by_id("X", Resolution::Day, id, 1)
            .unwrap();
        assert_eq!(pending.availability, Availability::Unresolved);
        assert!(pending.output.is_none());

        let candles = (1..=5).map(|i| close_candle(i as f64, i * 86_400_000)).collect();
        engine
            .submit_historic("X", Resolution::Day, candles, true)
            .unwrap();
        let read = engine.read_indicator("X", Resolution::Day, &spec, 2).unwrap();
        assert_eq!(
            read.output,
            Some(IndicatorOutput::Sma {
                values: vec![3.0, 4.0]
            })
        );

        let all = engine.read_indicators("X", Resolution::Day);
        assert_eq!(all.len(), 1);
        let output = all[0].1.as_ref().unwrap().output.as_ref().unwrap();
        assert_eq!(output.len(), 3);

        assert_eq!(
            engine
                .read_indicator("X", Resolution::Day, &spec, 4)
                .unwrap_err(),
            EngineError::InsufficientData { have: 5, need: 6 }
        );

        engine.remove_indicator("X", Resolution::Day, id).unwrap();
        assert_eq!(
            engine.read_indicator_by_id("X", Resolution::Day, id, 1).unwrap_err(),
            EngineError::UnknownIndicator(id)
        );
    }

    #[test]
    fn request_missing_asks_for_unresolved_pieces_then_subscribes() {
        let engine = Engine::default();
        let mut rx = engine.subscribe();
        engine.submit_quote("X", Some(quote(1.0, 1.0)));
        drain(&mut rx);

        engine.request_missing("X", Resolution::Min5);
        let events = drain(&mut rx);
        assert!(matches!(events[0], EngineEvent::SearchNeeded { .. }));
        assert!(matches!(
            events[1],
            EngineEvent::HistoricNeeded {
                resolution: Resolution::Min5,
                ..
            }
        ));
        assert!(matches!(events[2], EngineEvent::SubscribeRequested { .. }));
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn price_views_fall_back_to_quote() {
        let engine = Engine::default();
        assert_eq!(engine.current_price("X"), None);

        engine.submit_quote("X", Some(quote(50.0, 40.0)));
        assert_eq!(engine.current_price("X"), Some(50.0));
        assert_eq!(engine.previous_price("X"), Some(40.0));
        assert_eq!(engine.price_diff("X"), Some(10.0));
        assert_eq!(engine.change_percentage("X"), Some(0.0));

        engine.submit_tick("X", 52.0, 1.0, 1).unwrap();
        engine.submit_tick("X", 55.0, 1.0, 2).unwrap();
        assert_eq!(engine.current_price("X"), Some(55.0));
        assert_eq!(engine.previous_price("X"), Some(52.0));
        assert_eq!(engine.price_diff("X"), Some(3.0));
        assert_eq!(engine.change_percentage("X"), Some(10.0));

        engine.submit_quote("X", Some(quote(0.0, 0.0)));
        assert_eq!(engine.change_percentage("X"), Some(0.0));
    }

    #[test]
    fn provider_switch_resets_every_symbol() {
        let engine = Engine::default();
        engine.add_symbol("A");
        engine.add_symbol("B");
        engine.submit_quote("A", Some(quote(1.0, 1.0)));

        let old = DataProviderProfile::new("one", "k", "https://a", "wss://a");
        let new = DataProviderProfile::new("two", "k", "https://b", "wss://b");
        let switch = engine.switch_provider(Some(&old), &new);
        assert_eq!(switch.resets, vec!["A", "B"]);
        assert_eq!(engine.generation("A"), 1);
        assert_eq!(engine.quote("A").availability(), Availability::Unresolved);

        assert!(engine.switch_provider(Some(&new), &new).is_noop());
        assert_eq!(engine.generation("A"), 1);
    }

    #[test]
    fn remove_symbol_requests_unsubscribe() {
        let engine = Engine::default();
        let mut rx = engine.subscribe();
        engine.add_symbol("X");
        assert!(engine.remove_symbol("X"));
        assert!(!engine.remove_symbol("X"));
        assert_eq!(
            drain(&mut rx),
            vec![EngineEvent::UnsubscribeRequested { symbol: "X".into() }]
        );
    }

    #[test]
    fn config_seeds_symbols_and_alarms() {
        let mut config = EngineConfig::default();
        config.symbols = vec!["AAPL".into()];
        config.alarms.insert("MSFT".into(), vec![300.0, f64::NAN]);
        let engine = Engine::new(&config);
        assert_eq!(engine.symbols(), vec!["AAPL", "MSFT"]);
        assert_eq!(engine.alarms("MSFT"), vec![300.0]);
    }

    #[test]
    fn symbols_ingest_concurrently() {
        let engine = Arc::new(Engine::default());
        std::thread::scope(|s| {
            for sym in ["A", "B", "C", "D"] {
                let engine = Arc::clone(&engine);
                s.spawn(move || {
                    for t in 0..500 {
                        engine.submit_tick(sym, t as f64, 1.0, t).unwrap();
                    }
                });
            }
        });
        for sym in ["A", "B", "C", "D"] {
            assert_eq!(engine.inspect(sym, |b| b.buffered_ticks()), Some(500));
        }
    }
}
