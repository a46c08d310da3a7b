//! The sequential pipeline driver.
//!
//! A single logical thread of control executes stages strictly in
//! declaration order. The shared context is owned here and mutated only
//! between stage executions, when a successful outcome's delta is merged;
//! no stage ever observes a sibling's partial writes.

use super::retry::execute_with_retry;
use super::rollback::run_rollback;
use crate::cancellation::CancellationToken;
use crate::config::ExternalConfig;
use crate::context::{ContextResolver, StageContext, ValueSource};
use crate::core::{PipelineReport, PipelineStatus, StageRecord};
use crate::errors::{DeployError, ErrorCategory, HealthCheckExhausted, StageExecutionError};
use crate::events::{names, EventSink};
use crate::stages::Stage;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Hooks observing pipeline termination.
///
/// `on_failure` runs after rollback has completed, so the report it
/// receives already carries the rollback records alongside the original
/// error.
#[async_trait]
pub trait PipelineHooks: Send + Sync {
    /// Called once when every stage succeeded.
    async fn on_success(&self, _ctx: &StageContext, _report: &PipelineReport) {}

    /// Called once when the run failed, with the failing stage's name and
    /// the original triggering error.
    async fn on_failure(
        &self,
        _ctx: &StageContext,
        _failed_stage: &str,
        _error: &DeployError,
        _report: &PipelineReport,
    ) {
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHooks;

impl PipelineHooks for NoOpHooks {}

/// An ordered sequence of stages with success/failure hooks.
///
/// Constructed once from a validated stage list (see
/// [`super::PipelineBuilder`]) and run exactly once; `run` consumes the
/// pipeline so a second run is a compile error rather than a runtime
/// surprise.
pub struct Pipeline {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    hooks: Arc<dyn PipelineHooks>,
    config: ExternalConfig,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
    run_id: Uuid,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("run_id", &self.run_id)
            .finish()
    }
}

impl Pipeline {
    pub(super) fn from_parts(
        name: String,
        stages: Vec<Arc<dyn Stage>>,
        hooks: Arc<dyn PipelineHooks>,
        config: ExternalConfig,
        sink: Arc<dyn EventSink>,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        Self {
            name,
            stages,
            hooks,
            config,
            sink,
            cancel,
            run_id: Uuid::new_v4(),
        }
    }

    /// Starts building a pipeline.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> super::PipelineBuilder {
        super::PipelineBuilder::new(name)
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the cancellation token for this run.
    ///
    /// Grab it before calling [`Pipeline::run`]; cancelling mid-run takes
    /// the failure path at the next stage boundary.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// Executes all stages in declaration order and returns the report.
    ///
    /// On the first stage to exhaust its retry budget the driver stops,
    /// rolls back already-succeeded stages that declare compensation (most
    /// recently succeeded first), invokes the failure hook, and reports the
    /// original error. Succeeded stages are never re-run; failed stages are
    /// never retried past their budget.
    pub async fn run(self) -> PipelineReport {
        let started_at = Utc::now();
        let ctx = StageContext::new();

        info!(pipeline = %self.name, run_id = %self.run_id, stages = self.stages.len(), "pipeline starting");
        self.sink.try_emit(
            names::PIPELINE_STARTED,
            Some(serde_json::json!({ "pipeline": self.name.clone(), "run_id": self.run_id.to_string() })),
        );

        let mut records: Vec<StageRecord> = Vec::with_capacity(self.stages.len());
        let mut completed: Vec<Arc<dyn Stage>> = Vec::new();
        let mut failure: Option<(String, DeployError)> = None;

        for stage in &self.stages {
            if self.cancel.is_cancelled() {
                let reason = self
                    .cancel
                    .reason()
                    .unwrap_or_else(|| "operator abort".to_string());
                failure = Some((stage.name().to_string(), DeployError::Cancelled(reason)));
                break;
            }

            let stage_started = Utc::now();
            self.sink.try_emit(
                names::STAGE_STARTED,
                Some(serde_json::json!({ "stage": stage.name() })),
            );

            // Resolve declared inputs before the action runs. Values that
            // resolve from the operator fallback are materialized into the
            // context so the stage reads them like any other.
            let resolver = ContextResolver::new(&ctx, &self.config);
            let mut missing = None;
            for key in stage.requires() {
                match resolver.require(&key, stage.name()) {
                    Ok((value, ValueSource::Fallback)) => ctx.set(key, value),
                    Ok(_) => {}
                    Err(e) => {
                        missing = Some(e);
                        break;
                    }
                }
            }

            if let Some(e) = missing {
                // Structural failure: the action is never invoked.
                let record = StageRecord::failed(stage.name(), 0, stage_started, e.to_string());
                self.sink.try_emit(
                    names::STAGE_FAILED,
                    Some(serde_json::json!({ "stage": stage.name(), "error": e.to_string() })),
                );
                records.push(record);
                failure = Some((stage.name().to_string(), DeployError::from(e)));
                break;
            }

            let result = execute_with_retry(stage.as_ref(), &ctx).await;

            if result.outcome.is_success() {
                ctx.merge(result.outcome.delta.clone());
                self.sink.try_emit(
                    names::STAGE_COMPLETED,
                    Some(serde_json::json!({ "stage": stage.name(), "attempts": result.attempts })),
                );
                records.push(
                    StageRecord::completed(stage.name(), result.attempts, stage_started)
                        .with_advisories(result.outcome.advisories.clone()),
                );
                completed.push(stage.clone());
            } else {
                let message = result.outcome.error_message().to_string();
                self.sink.try_emit(
                    names::STAGE_FAILED,
                    Some(serde_json::json!({
                        "stage": stage.name(),
                        "attempts": result.attempts,
                        "error": message.clone(),
                    })),
                );
                records.push(
                    StageRecord::failed(stage.name(), result.attempts, stage_started, message.clone())
                        .with_advisories(result.outcome.advisories.clone()),
                );

                let err = match result.outcome.category {
                    Some(ErrorCategory::HealthCheck) => {
                        DeployError::from(HealthCheckExhausted::new(stage.name(), message))
                    }
                    _ => {
                        let mut e =
                            StageExecutionError::new(stage.name(), message, result.attempts);
                        if result.outcome.retryable {
                            e = e.retryable();
                        }
                        DeployError::from(e)
                    }
                };
                failure = Some((stage.name().to_string(), err));
                break;
            }
        }

        match failure {
            None => {
                let report = PipelineReport {
                    pipeline: self.name.clone(),
                    run_id: self.run_id,
                    status: PipelineStatus::Succeeded,
                    stages: records,
                    failed_stage: None,
                    error: None,
                    error_category: None,
                    rollback_attempted: false,
                    rollback: Vec::new(),
                    started_at,
                    ended_at: Utc::now(),
                };

                self.sink.try_emit(
                    names::PIPELINE_COMPLETED,
                    Some(serde_json::json!({ "pipeline": self.name.clone() })),
                );
                info!(pipeline = %self.name, run_id = %self.run_id, "pipeline completed");
                self.hooks.on_success(&ctx, &report).await;
                report
            }
            Some((failed_stage, err)) => self.fail(ctx, records, completed, failed_stage, err, started_at).await,
        }
    }

    async fn fail(
        &self,
        ctx: StageContext,
        records: Vec<StageRecord>,
        completed: Vec<Arc<dyn Stage>>,
        failed_stage: String,
        err: DeployError,
        started_at: chrono::DateTime<Utc>,
    ) -> PipelineReport {
        let (rollback_attempted, rollback) = if self.config.rollback_on_failure {
            (true, run_rollback(&completed, &ctx, &self.sink).await)
        } else {
            (false, Vec::new())
        };

        let report = PipelineReport {
            pipeline: self.name.clone(),
            run_id: self.run_id,
            status: PipelineStatus::Failed,
            stages: records,
            failed_stage: Some(failed_stage.clone()),
            error: Some(err.to_string()),
            error_category: Some(err.category()),
            rollback_attempted,
            rollback,
            started_at,
            ended_at: Utc::now(),
        };

        self.sink.try_emit(
            names::PIPELINE_FAILED,
            Some(serde_json::json!({
                "pipeline": self.name.clone(),
                "failed_stage": failed_stage.clone(),
                "error": err.to_string(),
                "category": err.category().to_string(),
                "rollback_attempted": rollback_attempted,
            })),
        );
        error!(
            pipeline = %self.name,
            run_id = %self.run_id,
            failed_stage = %failed_stage,
            category = %err.category(),
            rollback_attempted,
            rollback_failures = report.rollback_failures().len(),
            error = %err,
            "pipeline failed"
        );

        self.hooks.on_failure(&ctx, &failed_stage, &err, &report).await;
        report
    }
}
