//! Stage trait and adapters.
//!
//! Stages are the units of work a pipeline sequences. A stage declares the
//! context keys it reads and writes, its retry policy, and optionally a
//! compensating action invoked during rollback.

use crate::context::StageContext;
use crate::core::StageOutcome;
use crate::pipeline::RetryPolicy;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt::Debug;

/// Trait for pipeline stages.
///
/// Actions run under at-least-once semantics: with a retry policy of
/// `max_attempts > 1` the action may be invoked several times per run, so
/// every action must be idempotent or externally checked for idempotency.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage, unique within a pipeline.
    fn name(&self) -> &str;

    /// Context keys this stage reads.
    ///
    /// The driver resolves each before invoking the action; a key that no
    /// earlier stage produced and no fallback covers fails the run without
    /// invoking the action.
    fn requires(&self) -> Vec<String> {
        Vec::new()
    }

    /// Context keys this stage writes on success.
    fn provides(&self) -> Vec<String> {
        Vec::new()
    }

    /// Retry policy for the action. Defaults to a single attempt.
    fn retry(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    /// Executes the stage action against the shared context.
    ///
    /// The returned outcome's delta is merged into the context by the
    /// driver after a successful invocation.
    async fn execute(&self, ctx: &StageContext) -> StageOutcome;

    /// Whether this stage declares a compensating action.
    fn compensates(&self) -> bool {
        false
    }

    /// Reverses the effect of a previously successful execution.
    ///
    /// Invoked by the driver during rollback, in reverse completion order.
    /// Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns the compensation failure; the driver records it without
    /// masking the original pipeline error.
    async fn compensate(&self, _ctx: &StageContext) -> anyhow::Result<()> {
        Ok(())
    }
}

type StageFn = Box<dyn Fn(StageContext) -> BoxFuture<'static, StageOutcome> + Send + Sync>;

/// A stage built from an async closure.
///
/// Handy for tests and for one-off glue stages that do not warrant a
/// dedicated type.
pub struct FnStage {
    name: String,
    requires: Vec<String>,
    provides: Vec<String>,
    policy: RetryPolicy,
    func: StageFn,
}

impl FnStage {
    /// Creates a new closure-backed stage.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(StageContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StageOutcome> + Send + 'static,
    {
        Self {
            name: name.into(),
            requires: Vec::new(),
            provides: Vec::new(),
            policy: RetryPolicy::none(),
            func: Box::new(move |ctx| Box::pin(func(ctx))),
        }
    }

    /// Declares the context keys this stage reads.
    #[must_use]
    pub fn with_requires<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Declares the context keys this stage writes.
    #[must_use]
    pub fn with_provides<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Debug for FnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("provides", &self.provides)
            .finish()
    }
}

#[async_trait]
impl Stage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<String> {
        self.requires.clone()
    }

    fn provides(&self) -> Vec<String> {
        self.provides.clone()
    }

    fn retry(&self) -> RetryPolicy {
        self.policy.clone()
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        (self.func)(ctx.clone()).await
    }
}

/// A stage that succeeds without doing anything.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        StageOutcome::ok()
    }
}
