//! Cluster control-plane boundary and the manifest/rollout stages.

use crate::context::{keys, StageContext};
use crate::core::StageOutcome;
use crate::pipeline::RetryPolicy;
use crate::stages::Stage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One manifest document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest name (e.g. `deployment.yaml`).
    pub name: String,
    /// Raw manifest body.
    pub body: String,
}

impl Manifest {
    /// Creates a manifest.
    #[must_use]
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// An ordered set of manifests applied together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSet {
    manifests: Vec<Manifest>,
}

impl ManifestSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a manifest.
    #[must_use]
    pub fn with(mut self, manifest: Manifest) -> Self {
        self.manifests.push(manifest);
        self
    }

    /// Returns the manifests in order.
    #[must_use]
    pub fn manifests(&self) -> &[Manifest] {
        &self.manifests
    }

    /// Returns the number of manifests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Content checksum of the set.
    ///
    /// Stable across runs for identical content; used to tell a real apply
    /// from a no-op re-apply in logs and reports.
    #[must_use]
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for manifest in &self.manifests {
            hasher.update(manifest.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(manifest.body.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(&hasher.finalize()[..8])
    }
}

impl FromIterator<Manifest> for ManifestSet {
    fn from_iter<T: IntoIterator<Item = Manifest>>(iter: T) -> Self {
        Self {
            manifests: iter.into_iter().collect(),
        }
    }
}

/// The cluster control-plane boundary.
///
/// `apply_manifests` and `set_image` are idempotent by construction on the
/// platform side; `wait_for_rollout` blocks until the workload converges or
/// the timeout elapses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterControlPlane: Send + Sync {
    /// Applies a manifest set.
    async fn apply_manifests(&self, manifests: &ManifestSet) -> anyhow::Result<()>;

    /// Points a workload at an image reference.
    async fn set_image(&self, workload: &str, image: &str) -> anyhow::Result<()>;

    /// Returns the image reference a workload currently runs, if deployed.
    async fn current_image(&self, workload: &str) -> anyhow::Result<Option<String>>;

    /// Waits for a workload's rollout to converge.
    async fn wait_for_rollout(&self, workload: &str, timeout: Duration) -> anyhow::Result<()>;
}

/// Stage that applies the static manifest set.
pub struct ApplyManifestsStage {
    cluster: Arc<dyn ClusterControlPlane>,
    manifests: ManifestSet,
    policy: RetryPolicy,
}

impl ApplyManifestsStage {
    /// Creates an apply stage for a manifest set.
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterControlPlane>, manifests: ManifestSet) -> Self {
        Self {
            cluster,
            manifests,
            policy: RetryPolicy::none(),
        }
    }

    /// Sets the retry policy. Applying is idempotent, so retrying is safe.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl std::fmt::Debug for ApplyManifestsStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplyManifestsStage")
            .field("manifests", &self.manifests.len())
            .finish()
    }
}

#[async_trait]
impl Stage for ApplyManifestsStage {
    fn name(&self) -> &str {
        "apply-manifests"
    }

    fn provides(&self) -> Vec<String> {
        vec![keys::MANIFESTS_CHECKSUM.to_string()]
    }

    fn retry(&self) -> RetryPolicy {
        self.policy.clone()
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        let checksum = self.manifests.checksum();
        match self.cluster.apply_manifests(&self.manifests).await {
            Ok(()) => {
                info!(
                    manifests = self.manifests.len(),
                    %checksum,
                    "manifest set applied"
                );
                StageOutcome::ok().with_value(keys::MANIFESTS_CHECKSUM, checksum)
            }
            Err(e) => StageOutcome::fail(format!("manifest apply failed: {e}")),
        }
    }
}

/// Stage that points the workload at the new image and waits for the
/// rollout to converge.
///
/// Declares a compensating action: restore the image reference that was
/// live before this stage ran. Restoring is a `set_image` call, idempotent
/// like the forward operation.
pub struct RolloutStage {
    cluster: Arc<dyn ClusterControlPlane>,
    timeout: Duration,
    policy: RetryPolicy,
}

impl RolloutStage {
    /// Creates a rollout stage with the given convergence timeout.
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterControlPlane>, timeout: Duration) -> Self {
        Self {
            cluster,
            timeout,
            policy: RetryPolicy::none(),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl std::fmt::Debug for RolloutStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolloutStage")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl Stage for RolloutStage {
    fn name(&self) -> &str {
        "rollout"
    }

    fn requires(&self) -> Vec<String> {
        vec![keys::WORKLOAD_NAME.to_string(), keys::IMAGE_REFERENCE.to_string()]
    }

    fn provides(&self) -> Vec<String> {
        vec![keys::PREVIOUS_IMAGE.to_string()]
    }

    fn retry(&self) -> RetryPolicy {
        self.policy.clone()
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        let (Some(workload), Some(image)) =
            (ctx.get(keys::WORKLOAD_NAME), ctx.get(keys::IMAGE_REFERENCE))
        else {
            return StageOutcome::fail_fatal("rollout inputs missing from context");
        };

        let previous = match self.cluster.current_image(&workload).await {
            Ok(previous) => previous,
            Err(e) => return StageOutcome::fail(format!("could not read current image: {e}")),
        };

        if let Err(e) = self.cluster.set_image(&workload, &image).await {
            return StageOutcome::fail(format!("set image failed: {e}"));
        }

        if let Err(e) = self.cluster.wait_for_rollout(&workload, self.timeout).await {
            return StageOutcome::fail(format!("rollout of {image} did not converge: {e}"));
        }

        info!(%workload, %image, previous = previous.as_deref().unwrap_or("<none>"), "rollout converged");

        let mut outcome = StageOutcome::ok();
        if let Some(previous) = previous {
            outcome = outcome.with_value(keys::PREVIOUS_IMAGE, previous);
        }
        outcome
    }

    fn compensates(&self) -> bool {
        true
    }

    async fn compensate(&self, ctx: &StageContext) -> anyhow::Result<()> {
        let Some(workload) = ctx.get(keys::WORKLOAD_NAME) else {
            anyhow::bail!("workload name missing from context");
        };

        match ctx.get(keys::PREVIOUS_IMAGE) {
            Some(previous) => {
                info!(%workload, image = %previous, "restoring previous image");
                self.cluster.set_image(&workload, &previous).await
            }
            None => {
                // First deploy of this workload: nothing to restore.
                warn!(%workload, "no previous image recorded, skipping restore");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn rollout_context() -> StageContext {
        StageContext::from_pairs(vec![
            (keys::WORKLOAD_NAME, "tasks-api"),
            (keys::IMAGE_REFERENCE, "reg.example.com/team/tasks-api:ab12cd3-42"),
        ])
    }

    #[test]
    fn test_checksum_stable_and_content_sensitive() {
        let set = ManifestSet::new()
            .with(Manifest::new("deployment.yaml", "kind: Deployment"))
            .with(Manifest::new("service.yaml", "kind: Service"));

        let same = ManifestSet::new()
            .with(Manifest::new("deployment.yaml", "kind: Deployment"))
            .with(Manifest::new("service.yaml", "kind: Service"));

        let different = ManifestSet::new()
            .with(Manifest::new("deployment.yaml", "kind: Deployment # v2"))
            .with(Manifest::new("service.yaml", "kind: Service"));

        assert_eq!(set.checksum(), same.checksum());
        assert_ne!(set.checksum(), different.checksum());
        assert_eq!(set.checksum().len(), 16);
    }

    #[tokio::test]
    async fn test_apply_stage_writes_checksum() {
        let manifests = ManifestSet::new().with(Manifest::new("deployment.yaml", "kind: Deployment"));
        let checksum = manifests.checksum();

        let mut cluster = MockClusterControlPlane::new();
        cluster
            .expect_apply_manifests()
            .with(eq(manifests.clone()))
            .times(1)
            .returning(|_| Ok(()));

        let stage = ApplyManifestsStage::new(Arc::new(cluster), manifests);
        let outcome = stage.execute(&StageContext::new()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.delta[0], (keys::MANIFESTS_CHECKSUM.to_string(), checksum));
    }

    #[tokio::test]
    async fn test_rollout_records_previous_image() {
        let mut cluster = MockClusterControlPlane::new();
        cluster
            .expect_current_image()
            .with(eq("tasks-api"))
            .returning(|_| Ok(Some("reg.example.com/team/tasks-api:old-41".to_string())));
        cluster
            .expect_set_image()
            .with(eq("tasks-api"), eq("reg.example.com/team/tasks-api:ab12cd3-42"))
            .times(1)
            .returning(|_, _| Ok(()));
        cluster
            .expect_wait_for_rollout()
            .returning(|_, _| Ok(()));

        let stage = RolloutStage::new(Arc::new(cluster), Duration::from_secs(120));
        let outcome = stage.execute(&rollout_context()).await;

        assert!(outcome.is_success());
        assert_eq!(
            outcome.delta[0],
            (
                keys::PREVIOUS_IMAGE.to_string(),
                "reg.example.com/team/tasks-api:old-41".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_rollout_failure_is_retryable() {
        let mut cluster = MockClusterControlPlane::new();
        cluster.expect_current_image().returning(|_| Ok(None));
        cluster.expect_set_image().returning(|_, _| Ok(()));
        cluster
            .expect_wait_for_rollout()
            .returning(|_, _| Err(anyhow::anyhow!("progress deadline exceeded")));

        let stage = RolloutStage::new(Arc::new(cluster), Duration::from_secs(120));
        let outcome = stage.execute(&rollout_context()).await;

        assert!(outcome.is_failure());
        assert!(outcome.retryable);
    }

    #[tokio::test]
    async fn test_compensation_restores_previous_image() {
        let mut cluster = MockClusterControlPlane::new();
        cluster
            .expect_set_image()
            .with(eq("tasks-api"), eq("reg.example.com/team/tasks-api:old-41"))
            .times(1)
            .returning(|_, _| Ok(()));

        let stage = RolloutStage::new(Arc::new(cluster), Duration::from_secs(120));

        let ctx = rollout_context();
        ctx.set(keys::PREVIOUS_IMAGE, "reg.example.com/team/tasks-api:old-41");

        stage.compensate(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_compensation_without_previous_image_is_a_noop() {
        // No set_image expectation: calling it would fail the test.
        let cluster = MockClusterControlPlane::new();
        let stage = RolloutStage::new(Arc::new(cluster), Duration::from_secs(120));

        stage.compensate(&rollout_context()).await.unwrap();
    }
}
