//! Image registry boundary, tag derivation, and the push stage.

use crate::context::{keys, StageContext};
use crate::core::StageOutcome;
use crate::pipeline::RetryPolicy;
use crate::stages::Stage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A fully qualified image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Repository, including the registry host (e.g.
    /// `reg.example.com/team/tasks-api`).
    pub repository: String,
    /// Tag derived from commit hash and build counter.
    pub tag: String,
}

impl ImageRef {
    /// Creates an image reference with an explicit tag.
    #[must_use]
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Derives the tag from the commit hash and build counter.
    ///
    /// The same commit re-built gets a distinct tag, so a push is an
    /// idempotent overwrite only when the same build is re-run.
    #[must_use]
    pub fn tagged(
        repository: impl Into<String>,
        commit_short: &str,
        build_number: &str,
    ) -> Self {
        Self {
            repository: repository.into(),
            tag: format!("{commit_short}-{build_number}"),
        }
    }

    /// Returns the full `repository:tag` reference.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// The image registry boundary.
///
/// `push` overwrites on an existing tag, making it idempotent per tag.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    /// Pushes an image to the registry.
    async fn push(&self, image: &ImageRef) -> anyhow::Result<()>;
}

/// Stage that derives the image tag and pushes the built image.
///
/// The container build itself is owned by the image builder; this stage
/// only produces the tag and hands the reference to the registry.
pub struct PushImageStage {
    registry: Arc<dyn ImageRegistry>,
    policy: RetryPolicy,
}

impl PushImageStage {
    /// Creates a push stage.
    #[must_use]
    pub fn new(registry: Arc<dyn ImageRegistry>) -> Self {
        Self {
            registry,
            policy: RetryPolicy::none(),
        }
    }

    /// Sets the retry policy. Push is an idempotent overwrite on the same
    /// tag, so retrying is safe.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl std::fmt::Debug for PushImageStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushImageStage").finish()
    }
}

#[async_trait]
impl Stage for PushImageStage {
    fn name(&self) -> &str {
        "push-image"
    }

    fn requires(&self) -> Vec<String> {
        vec![
            keys::REGISTRY_URL.to_string(),
            keys::WORKLOAD_NAME.to_string(),
            keys::COMMIT_SHORT.to_string(),
            keys::BUILD_NUMBER.to_string(),
        ]
    }

    fn provides(&self) -> Vec<String> {
        vec![keys::IMAGE_TAG.to_string(), keys::IMAGE_REFERENCE.to_string()]
    }

    fn retry(&self) -> RetryPolicy {
        self.policy.clone()
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        let (Some(registry_url), Some(workload), Some(commit), Some(build)) = (
            ctx.get(keys::REGISTRY_URL),
            ctx.get(keys::WORKLOAD_NAME),
            ctx.get(keys::COMMIT_SHORT),
            ctx.get(keys::BUILD_NUMBER),
        ) else {
            return StageOutcome::fail_fatal("push-image inputs missing from context");
        };

        let image = ImageRef::tagged(format!("{registry_url}/{workload}"), &commit, &build);

        match self.registry.push(&image).await {
            Ok(()) => {
                info!(image = %image, "image pushed");
                StageOutcome::ok()
                    .with_value(keys::IMAGE_TAG, &image.tag)
                    .with_value(keys::IMAGE_REFERENCE, image.reference())
            }
            Err(e) => StageOutcome::fail(format!("push of {image} failed: {e}")),
        }
    }
}
