//! Stage and pipeline status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage is waiting its turn.
    Pending,
    /// Stage is currently executing.
    Running,
    /// Stage completed successfully.
    Ok,
    /// Stage failed.
    Fail,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Ok => write!(f, "ok"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Fail)
    }

    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }
}

/// The terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every stage completed successfully.
    Succeeded,
    /// A stage failed past its budget, or the run was aborted.
    Failed,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Ok.to_string(), "ok");
        assert_eq!(StageStatus::Fail.to_string(), "fail");
        assert_eq!(StageStatus::Pending.to_string(), "pending");
    }

    #[test]
    fn test_stage_status_predicates() {
        assert!(StageStatus::Ok.is_terminal());
        assert!(StageStatus::Fail.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
        assert!(StageStatus::Ok.is_success());
        assert!(StageStatus::Fail.is_failure());
    }

    #[test]
    fn test_serde_rename() {
        let json = serde_json::to_string(&StageStatus::Ok).unwrap();
        assert_eq!(json, r#""ok""#);

        let json = serde_json::to_string(&PipelineStatus::Succeeded).unwrap();
        assert_eq!(json, r#""succeeded""#);
    }
}
