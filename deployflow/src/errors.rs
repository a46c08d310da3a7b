//! Error types for the deployflow orchestration core.
//!
//! The taxonomy distinguishes transient stage failures (retried per policy)
//! from structural failures (never retried) and rollback failures (recorded
//! but never masking the original error).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error category surfaced on the final report for operator triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A stage action failed (build, push, apply, ...).
    Execution,
    /// A required upstream context value was never produced.
    MissingContext,
    /// The deployed workload never became healthy within the probe budget.
    HealthCheck,
    /// A compensating action failed during rollback.
    Rollback,
    /// The run was aborted by the operator.
    Cancelled,
    /// The pipeline definition or external configuration is invalid.
    Config,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Execution => write!(f, "execution"),
            Self::MissingContext => write!(f, "missing_context"),
            Self::HealthCheck => write!(f, "health_check"),
            Self::Rollback => write!(f, "rollback"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Config => write!(f, "config"),
        }
    }
}

/// Error raised when a stage's action fails past its retry budget.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("stage '{stage}' failed after {attempts} attempt(s): {message}")]
pub struct StageExecutionError {
    /// The stage that failed.
    pub stage: String,
    /// The last error message observed.
    pub message: String,
    /// How many times the action was invoked.
    pub attempts: u32,
    /// Whether the final failure was classified retryable.
    pub retryable: bool,
}

impl StageExecutionError {
    /// Creates a new stage execution error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            attempts,
            retryable: false,
        }
    }

    /// Marks the failure as retryable (exhausted its budget anyway).
    #[must_use]
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

/// Error raised when a required context key was never produced.
///
/// Structural by definition: retrying cannot conjure missing data, so the
/// pipeline fails immediately without invoking the stage's action.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("missing context value '{key}' required by stage '{stage}'")]
pub struct MissingContextValue {
    /// The key that was never written and has no configured fallback.
    pub key: String,
    /// The stage that required it.
    pub stage: String,
}

impl MissingContextValue {
    /// Creates a new missing-context error.
    #[must_use]
    pub fn new(key: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            stage: stage.into(),
        }
    }
}

/// Error raised when the health probe budget is consumed without a success.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("health check exhausted in stage '{stage}': {message}")]
pub struct HealthCheckExhausted {
    /// The health-check stage that exhausted its budget.
    pub stage: String,
    /// Description of the exhaustion (workload, probes attempted).
    pub message: String,
}

impl HealthCheckExhausted {
    /// Creates a new exhaustion error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a compensating action fails during rollback.
///
/// Never masks the original failure: the pipeline's reported error stays the
/// triggering one, and rollback errors are listed alongside it in the report.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("rollback of stage '{stage}' failed: {message}")]
pub struct RollbackError {
    /// The stage whose compensation failed.
    pub stage: String,
    /// The compensation failure message.
    pub message: String,
}

impl RollbackError {
    /// Creates a new rollback error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Error raised when a pipeline definition fails validation at build time.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The validation failure message.
    pub message: String,
    /// The stages involved.
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// The main error type for deployflow operations.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A stage action failed past its retry budget.
    #[error("{0}")]
    Execution(#[from] StageExecutionError),

    /// A required upstream context value was never produced.
    #[error("{0}")]
    MissingContext(#[from] MissingContextValue),

    /// The workload never became healthy within the probe budget.
    #[error("{0}")]
    HealthCheck(#[from] HealthCheckExhausted),

    /// A compensating action failed.
    #[error("{0}")]
    Rollback(#[from] RollbackError),

    /// The pipeline definition failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The run was aborted by the operator.
    #[error("pipeline cancelled: {0}")]
    Cancelled(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Returns the triage category for this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Execution(_) => ErrorCategory::Execution,
            Self::MissingContext(_) => ErrorCategory::MissingContext,
            Self::HealthCheck(_) => ErrorCategory::HealthCheck,
            Self::Rollback(_) => ErrorCategory::Rollback,
            Self::Cancelled(_) => ErrorCategory::Cancelled,
            Self::Validation(_) | Self::Config(_) | Self::Io(_) => ErrorCategory::Config,
        }
    }

    /// Returns true if repeating the failed operation could succeed.
    ///
    /// Structural errors (missing context, validation, config) are never
    /// retryable; repeating an operation cannot fix missing data.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Execution(e) => e.retryable,
            _ => false,
        }
    }
}
