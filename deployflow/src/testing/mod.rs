//! Testing utilities for deployment pipelines.
//!
//! This module provides:
//! - Mock stages and collaborator fakes
//! - Context and manifest fixtures
//! - Assertions over outcomes and reports

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_outcome_failed, assert_outcome_ok, assert_report_failed_at, assert_report_succeeded,
};
pub use fixtures::{deploy_context, fast_probe_config, sample_manifests, TestContext};
pub use mocks::{
    ClusterOp, CompensatingStage, FailingStage, FakeCluster, FlakyStage, MemoryTunnelProvider,
    RecordingRegistry, RecordingStage, ScriptedProbe, StaticEndpointResolver, StaticProvisioner,
};

/// Initializes tracing for tests, honoring `RUST_LOG`. Safe to call from
/// every test; only the first call installs the subscriber.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
