//! Infrastructure provisioning boundary and stage.

use crate::context::StageContext;
use crate::core::StageOutcome;
use crate::pipeline::RetryPolicy;
use crate::stages::Stage;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Resource outputs produced by an infrastructure reconciliation, keyed by
/// the context key they feed (e.g. `registry.url`, `cluster.endpoint`).
#[derive(Debug, Clone, Default)]
pub struct ResourceOutputs {
    values: Vec<(String, String)>,
}

impl ResourceOutputs {
    /// Creates an empty output set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an output value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    /// Gets an output value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the number of outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no outputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntoIterator for ResourceOutputs {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// The infrastructure provisioner boundary.
///
/// `apply` reconciles desired state and is idempotent: re-running with
/// unchanged desired state is a no-op that returns the same outputs.
#[async_trait]
pub trait InfraProvisioner: Send + Sync {
    /// Reconciles infrastructure and returns its resource outputs.
    async fn apply(&self) -> anyhow::Result<ResourceOutputs>;
}

/// Stage that reconciles infrastructure and feeds its outputs into the
/// context for downstream stages.
pub struct ProvisionStage {
    provisioner: Arc<dyn InfraProvisioner>,
    provides: Vec<String>,
    policy: RetryPolicy,
}

impl ProvisionStage {
    /// Creates a provisioning stage.
    #[must_use]
    pub fn new(provisioner: Arc<dyn InfraProvisioner>) -> Self {
        Self {
            provisioner,
            provides: Vec::new(),
            policy: RetryPolicy::none(),
        }
    }

    /// Declares the context keys this provisioner's outputs will produce,
    /// for build-time dependency validation.
    #[must_use]
    pub fn expecting<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the retry policy. Reconciliation is idempotent, so retrying a
    /// failed apply is safe.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl std::fmt::Debug for ProvisionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionStage")
            .field("provides", &self.provides)
            .finish()
    }
}

#[async_trait]
impl Stage for ProvisionStage {
    fn name(&self) -> &str {
        "provision"
    }

    fn provides(&self) -> Vec<String> {
        self.provides.clone()
    }

    fn retry(&self) -> RetryPolicy {
        self.policy.clone()
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        match self.provisioner.apply().await {
            Ok(outputs) => {
                info!(outputs = outputs.len(), "infrastructure reconciled");
                StageOutcome::ok_with(outputs)
            }
            Err(e) => StageOutcome::fail(format!("infrastructure apply failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::keys;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProvisioner {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl InfraProvisioner for CountingProvisioner {
        async fn apply(&self) -> anyhow::Result<ResourceOutputs> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                anyhow::bail!("cloud api throttled");
            }
            Ok(ResourceOutputs::new()
                .with(keys::REGISTRY_URL, "reg.example.com/team")
                .with(keys::CLUSTER_ENDPOINT, "https://cluster.example.com"))
        }
    }

    #[tokio::test]
    async fn test_outputs_become_context_delta() {
        let stage = ProvisionStage::new(Arc::new(CountingProvisioner {
            calls: AtomicU32::new(0),
            fail_first: 0,
        }))
        .expecting([keys::REGISTRY_URL, keys::CLUSTER_ENDPOINT]);

        let outcome = stage.execute(&StageContext::new()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.delta.len(), 2);
        assert_eq!(outcome.delta[0].0, keys::REGISTRY_URL);
    }

    #[tokio::test]
    async fn test_apply_failure_is_retryable() {
        let stage = ProvisionStage::new(Arc::new(CountingProvisioner {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        }));

        let outcome = stage.execute(&StageContext::new()).await;

        assert!(outcome.is_failure());
        assert!(outcome.retryable);
    }

    #[test]
    fn test_resource_outputs_lookup() {
        let outputs = ResourceOutputs::new().with("registry.url", "reg.example.com");
        assert_eq!(outputs.get("registry.url"), Some("reg.example.com"));
        assert_eq!(outputs.get("other"), None);
        assert!(!outputs.is_empty());
    }
}
