//! Mock stages and collaborator fakes for pipeline tests.

use crate::context::StageContext;
use crate::core::StageOutcome;
use crate::deploy::{
    ClusterControlPlane, ImageRef, ImageRegistry, InfraProvisioner, ManifestSet, ResourceOutputs,
};
use crate::health::{EndpointResolver, HealthProbe, Tunnel, TunnelProvider};
use crate::pipeline::RetryPolicy;
use crate::stages::Stage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A stage that records the context keys visible when it executes.
///
/// Useful for ordering assertions: a stage must see everything earlier
/// stages wrote and nothing later stages will write.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    provides: Vec<(String, String)>,
    seen_keys: Mutex<Vec<String>>,
}

impl RecordingStage {
    /// Creates a recording stage that writes the given delta on success.
    #[must_use]
    pub fn new<I, K, V>(name: impl Into<String>, provides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            provides: provides
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            seen_keys: Mutex::new(Vec::new()),
        }
    }

    /// Returns the context keys visible at execution time.
    #[must_use]
    pub fn seen_keys(&self) -> Vec<String> {
        self.seen_keys.lock().clone()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn provides(&self) -> Vec<String> {
        self.provides.iter().map(|(k, _)| k.clone()).collect()
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        *self.seen_keys.lock() = ctx.keys();
        StageOutcome::ok_with(self.provides.clone())
    }
}

/// A stage that fails a configured number of times, then succeeds.
///
/// Each invocation counts as one observable side effect.
#[derive(Debug)]
pub struct FlakyStage {
    name: String,
    failures: u32,
    policy: RetryPolicy,
    invocations: AtomicU32,
}

impl FlakyStage {
    /// Creates a stage failing `failures` times before succeeding.
    #[must_use]
    pub fn new(name: impl Into<String>, failures: u32, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            failures,
            policy,
            invocations: AtomicU32::new(0),
        }
    }

    /// Returns how many times the action was invoked.
    #[must_use]
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FlakyStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn retry(&self) -> RetryPolicy {
        self.policy.clone()
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        let n = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            StageOutcome::fail(format!("transient failure on attempt {n}"))
        } else {
            StageOutcome::ok()
        }
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    policy: RetryPolicy,
    retryable: bool,
    invocations: AtomicU32,
}

impl FailingStage {
    /// Creates a stage whose failures are retryable.
    #[must_use]
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            retryable: true,
            invocations: AtomicU32::new(0),
        }
    }

    /// Makes the failures structural (never retried).
    #[must_use]
    pub fn fatal(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// Returns how many times the action was invoked.
    #[must_use]
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn retry(&self) -> RetryPolicy {
        self.policy.clone()
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if self.retryable {
            StageOutcome::fail("always fails")
        } else {
            StageOutcome::fail_fatal("always fails")
        }
    }
}

/// A stage that succeeds and records its compensation into a shared log.
#[derive(Debug)]
pub struct CompensatingStage {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    fail_compensation: bool,
}

impl CompensatingStage {
    /// Creates a compensating stage appending to the shared log.
    #[must_use]
    pub fn new(name: impl Into<String>, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            log,
            fail_compensation: false,
        }
    }

    /// Makes the compensation fail after recording itself.
    #[must_use]
    pub fn failing_compensation(mut self) -> Self {
        self.fail_compensation = true;
        self
    }
}

#[async_trait]
impl Stage for CompensatingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        StageOutcome::ok()
    }

    fn compensates(&self) -> bool {
        true
    }

    async fn compensate(&self, _ctx: &StageContext) -> anyhow::Result<()> {
        self.log.lock().push(self.name.clone());
        if self.fail_compensation {
            anyhow::bail!("compensation of {} failed", self.name);
        }
        Ok(())
    }
}

/// A provisioner returning fixed resource outputs.
#[derive(Debug, Clone)]
pub struct StaticProvisioner {
    outputs: ResourceOutputs,
}

impl StaticProvisioner {
    /// Creates a provisioner with the given outputs.
    #[must_use]
    pub fn new(outputs: ResourceOutputs) -> Self {
        Self { outputs }
    }
}

#[async_trait]
impl InfraProvisioner for StaticProvisioner {
    async fn apply(&self) -> anyhow::Result<ResourceOutputs> {
        Ok(self.outputs.clone())
    }
}

/// A registry that records pushed references.
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    pushed: Mutex<Vec<String>>,
}

impl RecordingRegistry {
    /// Creates an empty recording registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pushed image references, in order.
    #[must_use]
    pub fn pushed(&self) -> Vec<String> {
        self.pushed.lock().clone()
    }
}

#[async_trait]
impl ImageRegistry for RecordingRegistry {
    async fn push(&self, image: &ImageRef) -> anyhow::Result<()> {
        self.pushed.lock().push(image.reference());
        Ok(())
    }
}

/// Operations a [`FakeCluster`] has performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOp {
    /// A manifest set was applied (checksum recorded).
    Apply(String),
    /// A workload was pointed at an image.
    SetImage(String, String),
    /// A rollout was awaited.
    WaitForRollout(String),
}

/// An in-memory cluster control plane recording every operation.
#[derive(Debug, Default)]
pub struct FakeCluster {
    ops: Mutex<Vec<ClusterOp>>,
    current_image: Mutex<Option<String>>,
}

impl FakeCluster {
    /// Creates a cluster with no deployed image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the currently deployed image.
    #[must_use]
    pub fn with_current_image(self, image: impl Into<String>) -> Self {
        *self.current_image.lock() = Some(image.into());
        self
    }

    /// Returns the operations performed, in order.
    #[must_use]
    pub fn ops(&self) -> Vec<ClusterOp> {
        self.ops.lock().clone()
    }

    /// Returns the image the cluster currently points at.
    #[must_use]
    pub fn deployed_image(&self) -> Option<String> {
        self.current_image.lock().clone()
    }
}

#[async_trait]
impl ClusterControlPlane for FakeCluster {
    async fn apply_manifests(&self, manifests: &ManifestSet) -> anyhow::Result<()> {
        self.ops.lock().push(ClusterOp::Apply(manifests.checksum()));
        Ok(())
    }

    async fn set_image(&self, workload: &str, image: &str) -> anyhow::Result<()> {
        self.ops
            .lock()
            .push(ClusterOp::SetImage(workload.to_string(), image.to_string()));
        *self.current_image.lock() = Some(image.to_string());
        Ok(())
    }

    async fn current_image(&self, _workload: &str) -> anyhow::Result<Option<String>> {
        Ok(self.current_image.lock().clone())
    }

    async fn wait_for_rollout(&self, workload: &str, _timeout: Duration) -> anyhow::Result<()> {
        self.ops
            .lock()
            .push(ClusterOp::WaitForRollout(workload.to_string()));
        Ok(())
    }
}

/// An endpoint resolver returning a fixed answer.
#[derive(Debug, Clone)]
pub struct StaticEndpointResolver(
    /// The endpoint to report, or `None` for an unreachable workload.
    pub Option<String>,
);

#[async_trait]
impl EndpointResolver for StaticEndpointResolver {
    async fn resolve_endpoint(&self, _workload: &str) -> anyhow::Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// A probe following a script of results, failing once the script runs out.
#[derive(Debug)]
pub struct ScriptedProbe {
    script: Mutex<Vec<bool>>,
    probes: AtomicU32,
}

impl ScriptedProbe {
    /// Creates a probe from a success/failure script.
    #[must_use]
    pub fn new(script: Vec<bool>) -> Self {
        Self {
            script: Mutex::new(script),
            probes: AtomicU32::new(0),
        }
    }

    /// Returns how many probes were issued.
    #[must_use]
    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, _endpoint: &str) -> anyhow::Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        let ok = if script.is_empty() { false } else { script.remove(0) };
        if ok {
            Ok(())
        } else {
            anyhow::bail!("probe failed")
        }
    }
}

struct MemoryTunnel {
    endpoint: String,
    closed: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl Tunnel for MemoryTunnel {
    fn local_endpoint(&self) -> &str {
        &self.endpoint
    }

    fn close(&self) {
        self.task.abort();
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A tunnel provider backed by a detached in-memory task.
///
/// Exposes flags for asserting that a tunnel was opened and that it was
/// terminated when the verification scope exited.
#[derive(Debug, Default)]
pub struct MemoryTunnelProvider {
    opened: AtomicU32,
    closed: Arc<AtomicBool>,
}

impl MemoryTunnelProvider {
    /// Creates a tunnel provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many tunnels were opened.
    #[must_use]
    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Returns true if the last tunnel was terminated.
    #[must_use]
    pub fn tunnel_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TunnelProvider for MemoryTunnelProvider {
    async fn open_tunnel(&self, workload: &str) -> anyhow::Result<Box<dyn Tunnel>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);

        // Detached pump; lives until the guard aborts it.
        let task = tokio::spawn(async {
            loop {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });

        Ok(Box::new(MemoryTunnel {
            endpoint: format!("127.0.0.1:15000/{workload}"),
            closed: self.closed.clone(),
            task,
        }))
    }
}
