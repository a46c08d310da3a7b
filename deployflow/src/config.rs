//! Operator-supplied external configuration.
//!
//! Everything an operator can tune without touching the pipeline definition:
//! fallback context values, the health probe budget, and rollback policy.
//! Attempt counts and intervals live here so nothing is hardcoded in the
//! orchestration core.

use crate::errors::DeployError;
use crate::health::{ExhaustionSeverity, ProbeConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const fn default_true() -> bool {
    true
}

/// External configuration consulted when the context lacks a value, plus
/// run-level policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExternalConfig {
    /// Fallback values keyed by context key (e.g. an operator-provided
    /// `registry.url`). Consulted only when no earlier stage produced the key.
    #[serde(default)]
    pub fallbacks: HashMap<String, String>,

    /// Health probe budget and intervals.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// How health-check exhaustion is treated. Defaults to fatal; the
    /// lenient variant must be an explicit operator choice.
    #[serde(default)]
    pub exhaustion: ExhaustionSeverity,

    /// Whether to run compensating actions when the pipeline fails.
    #[serde(default = "default_true")]
    pub rollback_on_failure: bool,
}

impl ExternalConfig {
    /// Creates an empty configuration with default policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rollback_on_failure: true,
            ..Self::default()
        }
    }

    /// Adds a fallback value for a context key.
    #[must_use]
    pub fn with_fallback(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fallbacks.insert(key.into(), value.into());
        self
    }

    /// Sets the probe configuration.
    #[must_use]
    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    /// Sets the exhaustion severity.
    #[must_use]
    pub fn with_exhaustion(mut self, exhaustion: ExhaustionSeverity) -> Self {
        self.exhaustion = exhaustion;
        self
    }

    /// Disables rollback on failure.
    #[must_use]
    pub fn without_rollback(mut self) -> Self {
        self.rollback_on_failure = false;
        self
    }

    /// Gets the fallback value for a key, if configured.
    #[must_use]
    pub fn fallback(&self, key: &str) -> Option<&str> {
        self.fallbacks.get(key).map(String::as_str)
    }

    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Io`] if the file cannot be read and
    /// [`DeployError::Config`] if it does not parse.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&raw).map_err(|e| {
            DeployError::Config(format!(
                "invalid configuration file {}: {e}",
                path.as_ref().display()
            ))
        })
    }
}
