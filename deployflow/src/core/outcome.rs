//! Stage outcome type with factory constructors.

use super::StageStatus;
use crate::errors::ErrorCategory;
use serde::{Deserialize, Serialize};

/// The result of one stage action invocation.
///
/// An outcome carries the key/value delta the driver merges into the shared
/// context, a failure classification when the action failed, and any
/// advisory notes the stage wants recorded in the final report.
///
/// Failure classification follows the propagation policy: plain failures
/// are transient and retried per the stage's policy; fatal failures are
/// structural and surface immediately regardless of remaining attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    /// The status of this invocation.
    pub status: StageStatus,

    /// Context delta produced by the action, in write order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delta: Vec<(String, String)>,

    /// Error message (for failed invocations).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the failure may be retried.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,

    /// Triage category for the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,

    /// Advisory notes: recorded in the report, never blocking.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<String>,
}

impl Default for StageOutcome {
    fn default() -> Self {
        Self::ok()
    }
}

impl StageOutcome {
    /// Creates a successful outcome with no context delta.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: StageStatus::Ok,
            delta: Vec::new(),
            error: None,
            retryable: false,
            category: None,
            advisories: Vec::new(),
        }
    }

    /// Creates a successful outcome carrying a context delta.
    #[must_use]
    pub fn ok_with<I, K, V>(delta: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut outcome = Self::ok();
        outcome.delta = delta
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        outcome
    }

    /// Creates a transient failure, retried per the stage's policy.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Fail,
            delta: Vec::new(),
            error: Some(error.into()),
            retryable: true,
            category: None,
            advisories: Vec::new(),
        }
    }

    /// Creates a structural failure that must not be retried.
    #[must_use]
    pub fn fail_fatal(error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Fail,
            delta: Vec::new(),
            error: Some(error.into()),
            retryable: false,
            category: None,
            advisories: Vec::new(),
        }
    }

    /// Adds a single delta entry.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.delta.push((key.into(), value.into()));
        self
    }

    /// Records an advisory note.
    #[must_use]
    pub fn with_advisory(mut self, note: impl Into<String>) -> Self {
        self.advisories.push(note.into());
        self
    }

    /// Sets the triage category of a failure.
    #[must_use]
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Returns true if this invocation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if this invocation failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Returns the error message, or an empty string.
    #[must_use]
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}
