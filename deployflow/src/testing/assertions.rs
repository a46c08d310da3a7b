//! Assertions over outcomes and reports.

use crate::core::{PipelineReport, StageOutcome};

/// Asserts that an outcome is a success.
///
/// # Panics
///
/// Panics with the outcome's error when it failed.
pub fn assert_outcome_ok(outcome: &StageOutcome) {
    assert!(
        outcome.is_success(),
        "expected success, got failure: {}",
        outcome.error_message()
    );
}

/// Asserts that an outcome failed with a message containing `needle`.
///
/// # Panics
///
/// Panics when the outcome succeeded or the message does not match.
pub fn assert_outcome_failed(outcome: &StageOutcome, needle: &str) {
    assert!(outcome.is_failure(), "expected failure, got success");
    assert!(
        outcome.error_message().contains(needle),
        "error '{}' does not contain '{needle}'",
        outcome.error_message()
    );
}

/// Asserts that a report is a success with exit code zero.
///
/// # Panics
///
/// Panics with the report's error when the run failed.
pub fn assert_report_succeeded(report: &PipelineReport) {
    assert!(
        report.is_success(),
        "expected success, run failed at {:?}: {:?}",
        report.failed_stage,
        report.error
    );
    assert_eq!(report.exit_code(), 0);
}

/// Asserts that a report failed at the named stage.
///
/// # Panics
///
/// Panics when the run succeeded or failed elsewhere.
pub fn assert_report_failed_at(report: &PipelineReport, stage: &str) {
    assert!(!report.is_success(), "expected failure, run succeeded");
    assert_eq!(
        report.failed_stage.as_deref(),
        Some(stage),
        "failed at {:?}, expected '{stage}'",
        report.failed_stage
    );
}
