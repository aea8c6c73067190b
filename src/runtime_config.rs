// =============================================================================
// Engine Configuration — JSON settings with atomic save
// =============================================================================
//
// Every tunable of the candle engine lives here. Persistence uses an atomic
// tmp + rename pattern to prevent corruption on crash. All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file.
//
// =============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::market_data::Resolution;
use crate::provider::DataProviderProfile;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_history_candles() -> usize {
    200
}

fn default_event_capacity() -> usize {
    1024
}

fn default_max_buffered_ticks() -> usize {
    100_000
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the candle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Symbols registered at start-up.
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Resolution the replay harness reads when none is given.
    #[serde(default)]
    pub default_resolution: Resolution,

    /// Number of buckets a historic request covers.
    #[serde(default = "default_history_candles")]
    pub history_candles: usize,

    /// Broadcast channel capacity for engine events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Hard cap on buffered live ticks per symbol.
    #[serde(default = "default_max_buffered_ticks")]
    pub max_buffered_ticks: usize,

    /// Known data providers.
    #[serde(default)]
    pub providers: Vec<DataProviderProfile>,

    /// Name of the provider currently in use.
    #[serde(default)]
    pub active_provider: Option<String>,

    /// Alarm thresholds per symbol, seeded into the engine at start-up.
    #[serde(default)]
    pub alarms: BTreeMap<String, Vec<f64>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            default_resolution: Resolution::default(),
            history_candles: default_history_candles(),
            event_capacity: default_event_capacity(),
            max_buffered_ticks: default_max_buffered_ticks(),
            providers: Vec::new(),
            active_provider: None,
            alarms: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid engine config in {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            providers = config.providers.len(),
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.history_candles == 0 {
            anyhow::bail!("history_candles must be at least 1");
        }
        if self.event_capacity == 0 {
            anyhow::bail!("event_capacity must be at least 1");
        }
        Ok(())
    }

    /// The active provider profile, if one is named and known.
    pub fn active_profile(&self) -> Option<&DataProviderProfile> {
        let name = self.active_provider.as_deref()?;
        let profile = self.providers.iter().find(|p| p.name == name);
        if profile.is_none() {
            warn!(provider = %name, "active provider not found among configured profiles");
        }
        profile
    }
}
