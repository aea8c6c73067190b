// =============================================================================
// Candle Engine — Replay Harness
// =============================================================================
//
// Feeds newline-delimited JSON commands through the engine and prints every
// emitted event and read result as one JSON line on stdout. Commands come from
// the file named by the first argument, or from stdin when none is given.
//
//   {"cmd":"historic","symbol":"X","resolution":"1m","candles":[...]}
//   {"cmd":"tick","symbol":"X","price":13.0,"volume":1.0,"time":90}
//   {"cmd":"read_series","symbol":"X","resolution":"1m","amount":3}
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use candle_engine::market_data::{QuoteSnapshot, SearchEntry};
use candle_engine::{
    Candle, Engine, EngineConfig, EngineEvent, IndicatorSpec, Resolution, SeriesKey,
};

// ── Commands ─────────────────────────────────────────────────────────────────

fn default_ok() -> bool {
    true
}

/// One replayed input line.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Command {
    AddSymbol {
        symbol: String,
    },
    RemoveSymbol {
        symbol: String,
    },
    Historic {
        symbol: String,
        #[serde(default)]
        resolution: Option<Resolution>,
        #[serde(default)]
        candles: Vec<Candle>,
        #[serde(default = "default_ok")]
        ok: bool,
        /// When present, the response is dropped unless it matches the
        /// symbol's current generation.
        #[serde(default)]
        generation: Option<u64>,
    },
    Tick {
        symbol: String,
        price: f64,
        #[serde(default)]
        volume: f64,
        time: i64,
    },
    Quote {
        symbol: String,
        #[serde(default)]
        quote: Option<QuoteSnapshot>,
    },
    Search {
        symbol: String,
        #[serde(default)]
        entry: Option<SearchEntry>,
    },
    Reset {
        symbol: String,
    },
    AddAlarm {
        symbol: String,
        threshold: f64,
    },
    RemoveAlarm {
        symbol: String,
        threshold: f64,
    },
    AddIndicator {
        symbol: String,
        #[serde(default)]
        resolution: Option<Resolution>,
        spec: IndicatorSpec,
    },
    RemoveIndicator {
        symbol: String,
        #[serde(default)]
        resolution: Option<Resolution>,
        id: Uuid,
    },
    ReadSeries {
        symbol: String,
        #[serde(default)]
        resolution: Option<Resolution>,
        amount: usize,
    },
    ReadIndicators {
        symbol: String,
        #[serde(default)]
        resolution: Option<Resolution>,
    },
    Prices {
        symbol: String,
    },
    RequestMissing {
        symbol: String,
        #[serde(default)]
        resolution: Option<Resolution>,
    },
    SwitchProvider {
        name: String,
    },
}

// ── Replay ───────────────────────────────────────────────────────────────────

struct Replay {
    engine: Arc<Engine>,
    config: EngineConfig,
    events: broadcast::Receiver<EngineEvent>,
}

impl Replay {
    fn new(config: EngineConfig) -> Self {
        let engine = Arc::new(Engine::new(&config));
        let events = engine.subscribe();
        Self {
            engine,
            config,
            events,
        }
    }

    /// Apply one command. Returns the lines to print: the command's own
    /// result (if any) followed by the events it caused.
    fn apply(&mut self, command: Command) -> Result<Vec<Value>> {
        let default_res = self.config.default_resolution;
        let engine = &self.engine;
        let mut out = Vec::new();

        match command {
            Command::AddSymbol { symbol } => {
                engine.add_symbol(&symbol);
            }
            Command::RemoveSymbol { symbol } => {
                engine.remove_symbol(&symbol);
            }
            Command::Historic {
                symbol,
                resolution,
                candles,
                ok,
                generation,
            } => {
                let resolution = resolution.unwrap_or(default_res);
                match generation {
                    Some(generation) => {
                        engine.submit_historic_for(&symbol, resolution, generation, candles, ok)?;
                    }
                    None => engine.submit_historic(&symbol, resolution, candles, ok)?,
                }
            }
            Command::Tick {
                symbol,
                price,
                volume,
                time,
            } => {
                engine.submit_tick(&symbol, price, volume, time)?;
            }
            Command::Quote { symbol, quote } => engine.submit_quote(&symbol, quote),
            Command::Search { symbol, entry } => engine.submit_search(&symbol, entry),
            Command::Reset { symbol } => engine.reset_symbol(&symbol),
            Command::AddAlarm { symbol, threshold } => {
                engine.add_alarm(&symbol, threshold)?;
            }
            Command::RemoveAlarm { symbol, threshold } => {
                engine.remove_alarm(&symbol, threshold);
            }
            Command::AddIndicator {
                symbol,
                resolution,
                spec,
            } => {
                let id = engine.add_indicator(&symbol, resolution.unwrap_or(default_res), spec)?;
                out.push(json!({ "indicator_added": id }));
            }
            Command::RemoveIndicator {
                symbol,
                resolution,
                id,
            } => {
                engine.remove_indicator(&symbol, resolution.unwrap_or(default_res), id)?;
            }
            Command::ReadSeries {
                symbol,
                resolution,
                amount,
            } => {
                let key = SeriesKey::new(symbol, resolution.unwrap_or(default_res));
                let read = engine.read_series(&key.symbol, key.resolution, amount)?;
                out.push(json!({ "series": key.to_string(), "read": read }));
            }
            Command::ReadIndicators { symbol, resolution } => {
                let key = SeriesKey::new(symbol, resolution.unwrap_or(default_res));
                for (spec, read) in engine.read_indicators(&key.symbol, key.resolution) {
                    let value = match read {
                        Ok(read) => json!({ "series": key.to_string(), "indicator": spec, "read": read }),
                        Err(e) => json!({ "series": key.to_string(), "indicator": spec, "error": e.to_string() }),
                    };
                    out.push(value);
                }
            }
            Command::Prices { symbol } => {
                let prices = engine.prices(&symbol);
                out.push(json!({
                    "symbol": symbol,
                    "current": prices.current,
                    "previous": prices.previous,
                    "diff": prices.diff(),
                    "change_percentage": engine.change_percentage(&symbol),
                }));
            }
            Command::RequestMissing { symbol, resolution } => {
                engine.request_missing(&symbol, resolution.unwrap_or(default_res));
            }
            Command::SwitchProvider { name } => {
                let new = self
                    .config
                    .providers
                    .iter()
                    .find(|p| p.name == name)
                    .cloned()
                    .with_context(|| format!("unknown provider profile '{name}'"))?;
                engine.switch_provider(self.config.active_profile(), &new);
                self.config.active_provider = Some(name);
            }
        }

        while let Ok(event) = self.events.try_recv() {
            out.push(serde_json::to_value(&event).context("failed to serialise event")?);
        }
        Ok(out)
    }

    /// Replay every line of `input`. Bad lines are reported and skipped.
    async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) -> Result<usize> {
        let mut lines = input.lines();
        let mut applied = 0usize;
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await.context("failed to read command")? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let result = serde_json::from_str::<Command>(line)
                .with_context(|| format!("line {line_no}: malformed command"))
                .and_then(|cmd| self.apply(cmd));

            match result {
                Ok(values) => {
                    applied += 1;
                    for value in values {
                        println!("{value}");
                    }
                }
                Err(e) => {
                    warn!(line = line_no, error = %e, "command rejected");
                    println!("{}", json!({ "line": line_no, "error": format!("{e:#}") }));
                }
            }
        }
        Ok(applied)
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("CANDLE_ENGINE_CONFIG").unwrap_or_else(|_| "candle_engine.json".into());
    let mut config = EngineConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });

    if let Ok(syms) = std::env::var("CANDLE_ENGINE_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    info!(symbols = ?config.symbols, "Configured symbols");

    let mut replay = Replay::new(config);
    let applied = match std::env::args().nth(1) {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open command file {path}"))?;
            replay.run(BufReader::new(file)).await?
        }
        None => replay.run(BufReader::new(tokio::io::stdin())).await?,
    };

    info!(
        applied,
        events = replay.engine.events_published(),
        "replay finished"
    );
    Ok(())
}
