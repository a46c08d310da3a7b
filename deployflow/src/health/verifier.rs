//! The health verification state machine.

use super::state::HealthState;
use super::tunnel::{TunnelGuard, TunnelProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Probe budget and intervals. All explicit configuration, so the same
/// machine serves any health-gated deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Maximum number of probes issued. Always >= 1.
    pub max_probes: u32,
    /// Wait between failed probes, in milliseconds.
    pub interval_ms: u64,
    /// Bounded wait for a reachable endpoint before falling back to a
    /// tunnel, in milliseconds.
    pub endpoint_wait_ms: u64,
    /// How often to re-attempt endpoint resolution within the wait window,
    /// in milliseconds.
    pub endpoint_poll_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_probes: 5,
            interval_ms: 30_000,
            endpoint_wait_ms: 10_000,
            endpoint_poll_ms: 500,
        }
    }
}

impl ProbeConfig {
    /// Creates a probe config with the given budget and interval.
    #[must_use]
    pub fn new(max_probes: u32, interval_ms: u64) -> Self {
        Self {
            max_probes: max_probes.max(1),
            interval_ms,
            ..Self::default()
        }
    }

    /// Sets the endpoint wait window.
    #[must_use]
    pub fn with_endpoint_wait_ms(mut self, wait_ms: u64) -> Self {
        self.endpoint_wait_ms = wait_ms;
        self
    }

    /// Sets the endpoint poll interval.
    #[must_use]
    pub fn with_endpoint_poll_ms(mut self, poll_ms: u64) -> Self {
        self.endpoint_poll_ms = poll_ms.max(1);
        self
    }
}

/// Resolves a reachable network endpoint for a deployed workload, e.g. a
/// load-balancer address. Owned by the cluster tooling.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// Returns the workload's endpoint, or `None` while it is not yet
    /// reachable.
    async fn resolve_endpoint(&self, workload: &str) -> anyhow::Result<Option<String>>;
}

/// Issues one health probe against an endpoint. Owned by the probe target's
/// client; the core only sees success or failure.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probes the endpoint's health path once.
    async fn probe(&self, endpoint: &str) -> anyhow::Result<()>;
}

/// The result of a verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthVerdict {
    /// The terminal state reached.
    pub state: HealthState,
    /// How many probes were issued.
    pub probes_attempted: u32,
    /// The endpoint probed, when one was reachable.
    pub endpoint: Option<String>,
    /// Whether probing went through the tunnel fallback.
    pub used_tunnel: bool,
}

impl HealthVerdict {
    /// Returns true if the workload was verified healthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self.state, HealthState::Healthy)
    }

    fn exhausted(probes_attempted: u32, endpoint: Option<String>, used_tunnel: bool) -> Self {
        Self {
            state: HealthState::Exhausted,
            probes_attempted,
            endpoint,
            used_tunnel,
        }
    }
}

/// Drives the health verification state machine for one workload.
pub struct HealthVerifier {
    resolver: Arc<dyn EndpointResolver>,
    probe: Arc<dyn HealthProbe>,
    tunnel_provider: Option<Arc<dyn TunnelProvider>>,
    config: ProbeConfig,
}

impl std::fmt::Debug for HealthVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthVerifier")
            .field("config", &self.config)
            .field("has_tunnel_provider", &self.tunnel_provider.is_some())
            .finish()
    }
}

impl HealthVerifier {
    /// Creates a verifier without a tunnel fallback.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn EndpointResolver>,
        probe: Arc<dyn HealthProbe>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            resolver,
            probe,
            tunnel_provider: None,
            config,
        }
    }

    /// Enables the tunnel fallback.
    #[must_use]
    pub fn with_tunnel_provider(mut self, provider: Arc<dyn TunnelProvider>) -> Self {
        self.tunnel_provider = Some(provider);
        self
    }

    /// Runs the state machine to a terminal state.
    ///
    /// Any tunnel opened during verification is terminated before this
    /// returns, whatever the outcome: the guard's lifetime is this call's
    /// scope.
    pub async fn verify(&self, workload: &str) -> HealthVerdict {
        let mut state = HealthState::AwaitingEndpoint;
        debug!(%workload, %state, "health verification starting");

        let mut tunnel_guard: Option<TunnelGuard> = None;
        let mut used_tunnel = false;

        let endpoint = match self.await_endpoint(workload).await {
            Some(endpoint) => endpoint,
            None => match self.open_fallback_tunnel(workload).await {
                Some(guard) => {
                    let endpoint = guard.local_endpoint().to_string();
                    tunnel_guard = Some(guard);
                    used_tunnel = true;
                    endpoint
                }
                None => {
                    warn!(%workload, "no reachable endpoint and no tunnel fallback");
                    return HealthVerdict::exhausted(0, None, false);
                }
            },
        };

        state = HealthState::ProbingHealth;
        debug!(%workload, %state, %endpoint, used_tunnel, "probing health path");

        let mut probes_attempted = 0;
        while probes_attempted < self.config.max_probes {
            probes_attempted += 1;

            match self.probe.probe(&endpoint).await {
                Ok(()) => {
                    state = HealthState::Healthy;
                    info!(%workload, %endpoint, probes_attempted, "workload healthy");
                    // Dropping the guard here tears the tunnel down.
                    drop(tunnel_guard);
                    return HealthVerdict {
                        state,
                        probes_attempted,
                        endpoint: Some(endpoint),
                        used_tunnel,
                    };
                }
                Err(e) => {
                    warn!(
                        %workload,
                        %endpoint,
                        probe = probes_attempted,
                        budget = self.config.max_probes,
                        error = %e,
                        "health probe failed"
                    );
                    if probes_attempted < self.config.max_probes {
                        tokio::time::sleep(Duration::from_millis(self.config.interval_ms)).await;
                    }
                }
            }
        }

        warn!(%workload, probes_attempted, "health probe budget exhausted");
        drop(tunnel_guard);
        HealthVerdict::exhausted(probes_attempted, Some(endpoint), used_tunnel)
    }

    async fn await_endpoint(&self, workload: &str) -> Option<String> {
        let deadline = Instant::now() + Duration::from_millis(self.config.endpoint_wait_ms);

        loop {
            match self.resolver.resolve_endpoint(workload).await {
                Ok(Some(endpoint)) => return Some(endpoint),
                Ok(None) => debug!(%workload, "endpoint not yet reachable"),
                Err(e) => debug!(%workload, error = %e, "endpoint resolution failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let poll = Duration::from_millis(self.config.endpoint_poll_ms).min(deadline - now);
            tokio::time::sleep(poll).await;
        }
    }

    async fn open_fallback_tunnel(&self, workload: &str) -> Option<TunnelGuard> {
        let provider = self.tunnel_provider.as_ref()?;
        match provider.open_tunnel(workload).await {
            Ok(tunnel) => {
                let guard = TunnelGuard::new(tunnel);
                info!(%workload, endpoint = guard.local_endpoint(), "opened tunnel fallback");
                Some(guard)
            }
            Err(e) => {
                warn!(%workload, error = %e, "tunnel fallback failed to open");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Tunnel;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct StaticResolver(Option<String>);

    #[async_trait]
    impl EndpointResolver for StaticResolver {
        async fn resolve_endpoint(&self, _workload: &str) -> anyhow::Result<Option<String>> {
            Ok(self.0.clone())
        }
    }

    /// Probe that follows a script of results, then keeps failing.
    struct ScriptedProbe {
        script: Mutex<Vec<bool>>,
        calls: AtomicU32,
    }

    impl ScriptedProbe {
        fn new(script: Vec<bool>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, _endpoint: &str) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock();
            let ok = if script.is_empty() { false } else { script.remove(0) };
            if ok {
                Ok(())
            } else {
                anyhow::bail!("connection refused")
            }
        }
    }

    struct FlagTunnel {
        closed: Arc<AtomicBool>,
    }

    impl Tunnel for FlagTunnel {
        fn local_endpoint(&self) -> &str {
            "127.0.0.1:15000"
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct FlagTunnelProvider {
        closed: Arc<AtomicBool>,
        opened: AtomicU32,
    }

    #[async_trait]
    impl TunnelProvider for FlagTunnelProvider {
        async fn open_tunnel(&self, _workload: &str) -> anyhow::Result<Box<dyn Tunnel>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FlagTunnel {
                closed: self.closed.clone(),
            }))
        }
    }

    fn fast_config(max_probes: u32) -> ProbeConfig {
        ProbeConfig {
            max_probes,
            interval_ms: 1,
            endpoint_wait_ms: 10,
            endpoint_poll_ms: 1,
        }
    }

    #[test]
    fn test_probe_config_defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.max_probes, 5);
        assert_eq!(config.interval_ms, 30_000);
    }

    #[test]
    fn test_probe_budget_clamped() {
        assert_eq!(ProbeConfig::new(0, 100).max_probes, 1);
    }

    #[tokio::test]
    async fn test_healthy_after_two_failures() {
        let resolver = Arc::new(StaticResolver(Some("lb.example.com".to_string())));
        let probe = Arc::new(ScriptedProbe::new(vec![false, false, true]));
        let verifier = HealthVerifier::new(resolver, probe.clone(), fast_config(3));

        let verdict = verifier.verify("tasks-api").await;

        assert!(verdict.is_healthy());
        assert_eq!(verdict.probes_attempted, 3);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        assert_eq!(verdict.endpoint, Some("lb.example.com".to_string()));
        assert!(!verdict.used_tunnel);
    }

    #[tokio::test]
    async fn test_exhausted_after_budget() {
        let resolver = Arc::new(StaticResolver(Some("lb.example.com".to_string())));
        let probe = Arc::new(ScriptedProbe::new(vec![]));
        let verifier = HealthVerifier::new(resolver, probe.clone(), fast_config(4));

        let verdict = verifier.verify("tasks-api").await;

        assert_eq!(verdict.state, HealthState::Exhausted);
        assert_eq!(verdict.probes_attempted, 4);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_tunnel_fallback_when_endpoint_unavailable() {
        let closed = Arc::new(AtomicBool::new(false));
        let provider = Arc::new(FlagTunnelProvider {
            closed: closed.clone(),
            opened: AtomicU32::new(0),
        });
        let resolver = Arc::new(StaticResolver(None));
        let probe = Arc::new(ScriptedProbe::new(vec![true]));
        let verifier = HealthVerifier::new(resolver, probe, fast_config(3))
            .with_tunnel_provider(provider.clone());

        let verdict = verifier.verify("tasks-api").await;

        assert!(verdict.is_healthy());
        assert!(verdict.used_tunnel);
        assert_eq!(verdict.endpoint, Some("127.0.0.1:15000".to_string()));
        assert_eq!(provider.opened.load(Ordering::SeqCst), 1);
        // Tunnel terminated once verification concluded.
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_tunnel_closed_on_exhaustion_too() {
        let closed = Arc::new(AtomicBool::new(false));
        let provider = Arc::new(FlagTunnelProvider {
            closed: closed.clone(),
            opened: AtomicU32::new(0),
        });
        let resolver = Arc::new(StaticResolver(None));
        let probe = Arc::new(ScriptedProbe::new(vec![]));
        let verifier = HealthVerifier::new(resolver, probe, fast_config(2))
            .with_tunnel_provider(provider);

        let verdict = verifier.verify("tasks-api").await;

        assert_eq!(verdict.state, HealthState::Exhausted);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_no_endpoint_no_tunnel_is_exhausted_without_probes() {
        let resolver = Arc::new(StaticResolver(None));
        let probe = Arc::new(ScriptedProbe::new(vec![true]));
        let verifier = HealthVerifier::new(resolver, probe.clone(), fast_config(3));

        let verdict = verifier.verify("tasks-api").await;

        assert_eq!(verdict.state, HealthState::Exhausted);
        assert_eq!(verdict.probes_attempted, 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }
}
