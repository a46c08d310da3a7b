//! Run report types: per-stage records, rollback records, and the final
//! pipeline report with its process exit code mapping.

use super::{PipelineStatus, StageStatus};
use crate::errors::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record of a single stage's execution within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Terminal status of the stage.
    pub status: StageStatus,
    /// How many times the action was invoked (retries included).
    pub attempts: u32,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
    /// Error message if the stage failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Advisory notes recorded by the stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<String>,
}

impl StageRecord {
    /// Creates a completed stage record.
    #[must_use]
    pub fn completed(name: impl Into<String>, attempts: u32, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Ok,
            attempts,
            started_at,
            ended_at: Utc::now(),
            error: None,
            advisories: Vec::new(),
        }
    }

    /// Creates a failed stage record.
    #[must_use]
    pub fn failed(
        name: impl Into<String>,
        attempts: u32,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Fail,
            attempts,
            started_at,
            ended_at: Utc::now(),
            error: Some(error.into()),
            advisories: Vec::new(),
        }
    }

    /// Attaches advisory notes.
    #[must_use]
    pub fn with_advisories(mut self, advisories: Vec<String>) -> Self {
        self.advisories = advisories;
        self
    }

    /// Returns the stage duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64
    }
}

/// Outcome of one compensating action during rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackOutcome {
    /// The compensation ran successfully.
    Compensated,
    /// The compensation itself failed.
    Failed,
}

/// Record of one compensating action during rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRecord {
    /// The stage whose compensation was invoked.
    pub stage: String,
    /// Whether the compensation succeeded.
    pub outcome: RollbackOutcome,
    /// Error message if the compensation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RollbackRecord {
    /// Records a successful compensation.
    #[must_use]
    pub fn compensated(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            outcome: RollbackOutcome::Compensated,
            error: None,
        }
    }

    /// Records a failed compensation.
    #[must_use]
    pub fn failed(stage: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            outcome: RollbackOutcome::Failed,
            error: Some(error.into()),
        }
    }
}

/// The final report of a pipeline run.
///
/// On failure the report always carries the *original* triggering error;
/// rollback errors are listed separately and never replace it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Pipeline name.
    pub pipeline: String,
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Terminal status of the run.
    pub status: PipelineStatus,
    /// Per-stage records, in execution order.
    pub stages: Vec<StageRecord>,
    /// Name of the failing stage, if the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    /// The original triggering error, if the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Triage category of the triggering error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    /// Whether rollback was attempted.
    pub rollback_attempted: bool,
    /// Per-compensation records, in invocation (reverse completion) order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback: Vec<RollbackRecord>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub ended_at: DateTime<Utc>,
}

impl PipelineReport {
    /// Returns true if every stage completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, PipelineStatus::Succeeded)
    }

    /// Returns the process exit code for this run.
    ///
    /// `0` on success, `2` when the workload never became healthy, `1` for
    /// every other unrecovered failure, so operators can distinguish
    /// "deployment failed" from "health check failed".
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match (self.status, self.error_category) {
            (PipelineStatus::Succeeded, _) => 0,
            (PipelineStatus::Failed, Some(ErrorCategory::HealthCheck)) => 2,
            (PipelineStatus::Failed, _) => 1,
        }
    }

    /// Returns all advisory notes recorded during the run, with the stage
    /// that recorded each.
    #[must_use]
    pub fn advisories(&self) -> Vec<(String, String)> {
        self.stages
            .iter()
            .flat_map(|s| s.advisories.iter().map(|a| (s.name.clone(), a.clone())))
            .collect()
    }

    /// Returns rollback records for compensations that themselves failed.
    #[must_use]
    pub fn rollback_failures(&self) -> Vec<&RollbackRecord> {
        self.rollback
            .iter()
            .filter(|r| r.outcome == RollbackOutcome::Failed)
            .collect()
    }

    /// Returns the run duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64
    }

    /// Renders the report as pretty JSON for operator tooling.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}
