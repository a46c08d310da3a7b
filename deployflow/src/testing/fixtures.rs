//! Shared fixtures for pipeline tests.

use crate::context::{keys, StageContext};
use crate::deploy::{Manifest, ManifestSet};
use crate::health::ProbeConfig;

/// Builder for pre-populated stage contexts.
#[derive(Debug, Default)]
pub struct TestContext {
    values: Vec<(String, String)>,
}

impl TestContext {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a context value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> StageContext {
        StageContext::from_pairs(self.values)
    }
}

/// A context seeded the way a build environment would: commit, build
/// counter, and workload name.
#[must_use]
pub fn deploy_context() -> StageContext {
    TestContext::new()
        .with_value(keys::COMMIT_SHA, "ab12cd3ef4567890")
        .with_value(keys::COMMIT_SHORT, "ab12cd3")
        .with_value(keys::BUILD_NUMBER, "42")
        .with_value(keys::WORKLOAD_NAME, "tasks-api")
        .build()
}

/// A small manifest set resembling a workload deployment.
#[must_use]
pub fn sample_manifests() -> ManifestSet {
    ManifestSet::new()
        .with(Manifest::new(
            "deployment.yaml",
            "kind: Deployment\nmetadata:\n  name: tasks-api\n",
        ))
        .with(Manifest::new(
            "service.yaml",
            "kind: Service\nmetadata:\n  name: tasks-api\n",
        ))
}

/// A probe config with millisecond waits, for fast tests.
#[must_use]
pub fn fast_probe_config(max_probes: u32) -> ProbeConfig {
    ProbeConfig {
        max_probes,
        interval_ms: 1,
        endpoint_wait_ms: 10,
        endpoint_poll_ms: 1,
    }
}
