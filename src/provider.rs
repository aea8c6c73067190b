// =============================================================================
// Data provider profiles and the provider-switch transition
// =============================================================================
//
// Switching provider is a pure state transition: it returns the resets the
// orchestration layer must apply and never touches engine state itself.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Connection profile for one market-data provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProviderProfile {
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub pull_url: String,
    #[serde(default)]
    pub push_url: String,
}

impl DataProviderProfile {
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        pull_url: impl Into<String>,
        push_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            pull_url: pull_url.into(),
            push_url: push_url.into(),
        }
    }

    /// A profile is usable only when no field is blank.
    pub fn is_valid(&self) -> bool {
        [&self.name, &self.api_key, &self.pull_url, &self.push_url]
            .iter()
            .all(|s| !s.trim().is_empty())
    }
}

impl PartialOrd for DataProviderProfile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DataProviderProfile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.pull_url.cmp(&other.pull_url))
            .then_with(|| self.push_url.cmp(&other.push_url))
            .then_with(|| self.api_key.cmp(&other.api_key))
    }
}

/// Outcome of a provider switch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderSwitch {
    /// Symbols whose state must be reset to `Unresolved`.
    pub resets: Vec<String>,
}

impl ProviderSwitch {
    pub fn is_noop(&self) -> bool {
        self.resets.is_empty()
    }
}

/// Compute the resets implied by moving from `old` to `new`.
///
/// Every symbol resets unless the profile is unchanged.
pub fn switch_provider(
    old: Option<&DataProviderProfile>,
    new: &DataProviderProfile,
    symbols: &[String],
) -> ProviderSwitch {
    if old == Some(new) {
        return ProviderSwitch::default();
    }
    ProviderSwitch {
        resets: symbols.to_vec(),
    }
}
