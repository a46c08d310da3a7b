//! Health verification states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The states of the health verification machine.
///
/// `AwaitingEndpoint -> ProbingHealth -> Healthy` is the success path;
/// `Exhausted` is reached only after the probe budget is consumed without
/// a single success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Resolving a reachable endpoint for the deployed workload.
    AwaitingEndpoint,
    /// Issuing bounded probes against the health path.
    ProbingHealth,
    /// A probe succeeded. Terminal success.
    Healthy,
    /// The probe budget was consumed. Terminal failure.
    Exhausted,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingEndpoint => write!(f, "awaiting_endpoint"),
            Self::ProbingHealth => write!(f, "probing_health"),
            Self::Healthy => write!(f, "healthy"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

impl HealthState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Healthy | Self::Exhausted)
    }
}
