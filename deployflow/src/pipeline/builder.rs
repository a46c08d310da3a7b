//! Pipeline builder with build-time data-dependency validation.

use super::driver::{NoOpHooks, Pipeline, PipelineHooks};
use crate::cancellation::CancellationToken;
use crate::config::ExternalConfig;
use crate::errors::PipelineValidationError;
use crate::events::{get_event_sink, EventSink};
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;

/// Builds a [`Pipeline`] from an ordered stage list.
///
/// `build` validates the definition before anything executes: stage names
/// must be unique, and every key a stage declares in `requires()` must be
/// produced by an earlier stage's `provides()` or covered by an operator
/// fallback. A pipeline that would fail at runtime on a data dependency is
/// rejected here instead.
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Arc<dyn Stage>>,
    hooks: Arc<dyn PipelineHooks>,
    config: ExternalConfig,
    sink: Option<Arc<dyn EventSink>>,
    cancel: Option<Arc<CancellationToken>>,
}

impl PipelineBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            hooks: Arc::new(NoOpHooks),
            config: ExternalConfig::new(),
            sink: None,
            cancel: None,
        }
    }

    /// Appends a stage. Execution order is append order.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Sets the success/failure hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn PipelineHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Sets the external configuration.
    #[must_use]
    pub fn config(mut self, config: ExternalConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink; defaults to the global sink.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Supplies an external cancellation token, so an operator-level signal
    /// handler can be wired up before the run starts.
    #[must_use]
    pub fn cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validates the definition and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineValidationError`] for an empty pipeline, duplicate
    /// stage names, or a declared requirement no earlier stage produces and
    /// no fallback covers.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "pipeline '{}' has no stages",
                self.name
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name()) {
                return Err(PipelineValidationError::new(format!(
                    "duplicate stage name '{}' in pipeline '{}'",
                    stage.name(),
                    self.name
                ))
                .with_stages(vec![stage.name().to_string()]));
            }
        }

        let mut produced: HashSet<String> = HashSet::new();
        for stage in &self.stages {
            for key in stage.requires() {
                if !produced.contains(&key) && self.config.fallback(&key).is_none() {
                    return Err(PipelineValidationError::new(format!(
                        "stage '{}' requires '{}', which no earlier stage produces and no fallback covers",
                        stage.name(),
                        key
                    ))
                    .with_stages(vec![stage.name().to_string()]));
                }
            }
            produced.extend(stage.provides());
        }

        let sink = self.sink.unwrap_or_else(get_event_sink);
        let cancel = self
            .cancel
            .unwrap_or_else(|| Arc::new(CancellationToken::new()));
        Ok(Pipeline::from_parts(
            self.name,
            self.stages,
            self.hooks,
            self.config,
            sink,
            cancel,
        ))
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{FnStage, NoOpStage};
    use crate::core::StageOutcome;

    fn noop(name: &str) -> Arc<dyn Stage> {
        Arc::new(NoOpStage::new(name))
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = PipelineBuilder::new("deploy").build().unwrap_err();
        assert!(err.message.contains("no stages"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = PipelineBuilder::new("deploy")
            .stage(noop("provision"))
            .stage(noop("provision"))
            .build()
            .unwrap_err();

        assert!(err.message.contains("duplicate stage name 'provision'"));
        assert_eq!(err.stages, vec!["provision".to_string()]);
    }

    #[test]
    fn test_unsatisfied_requirement_rejected() {
        let push = FnStage::new("push-image", |_ctx| async { StageOutcome::ok() })
            .with_requires(["registry.url"]);

        let err = PipelineBuilder::new("deploy")
            .stage(Arc::new(push))
            .build()
            .unwrap_err();

        assert!(err.message.contains("registry.url"));
        assert_eq!(err.stages, vec!["push-image".to_string()]);
    }

    #[test]
    fn test_requirement_satisfied_by_earlier_stage() {
        let provision = FnStage::new("provision", |_ctx| async { StageOutcome::ok() })
            .with_provides(["registry.url"]);
        let push = FnStage::new("push-image", |_ctx| async { StageOutcome::ok() })
            .with_requires(["registry.url"]);

        let pipeline = PipelineBuilder::new("deploy")
            .stage(Arc::new(provision))
            .stage(Arc::new(push))
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_count(), 2);
    }

    #[test]
    fn test_requirement_satisfied_by_fallback() {
        let push = FnStage::new("push-image", |_ctx| async { StageOutcome::ok() })
            .with_requires(["registry.url"]);

        let pipeline = PipelineBuilder::new("deploy")
            .stage(Arc::new(push))
            .config(ExternalConfig::new().with_fallback("registry.url", "reg.example.com"))
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_count(), 1);
    }

    #[test]
    fn test_order_matters_for_production() {
        // Consumer declared before the producer: rejected.
        let push = FnStage::new("push-image", |_ctx| async { StageOutcome::ok() })
            .with_requires(["registry.url"]);
        let provision = FnStage::new("provision", |_ctx| async { StageOutcome::ok() })
            .with_provides(["registry.url"]);

        let err = PipelineBuilder::new("deploy")
            .stage(Arc::new(push))
            .stage(Arc::new(provision))
            .build()
            .unwrap_err();

        assert!(err.message.contains("push-image"));
    }
}
