//! Local-access tunnel fallback for health verification.
//!
//! Externally provisioned load balancers can take longer to become
//! reachable than the workload itself. When endpoint resolution times out,
//! the verifier falls back to an ephemeral tunnel to the workload instead
//! of failing immediately. The tunnel runs detached for the duration of
//! the health-check stage only; the guard here ties its lifetime to the
//! verification scope.

use async_trait::async_trait;
use tracing::debug;

/// An open tunnel to a workload.
///
/// Implementations typically pump a background task or child process;
/// `close` must be idempotent because the guard may close explicitly and
/// again on drop.
pub trait Tunnel: Send + Sync {
    /// The locally reachable endpoint of the tunnel.
    fn local_endpoint(&self) -> &str;

    /// Terminates the tunnel.
    fn close(&self);
}

/// Opens tunnels to workloads. Owned by the cluster tooling, out of scope
/// for the core.
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Opens an ephemeral tunnel to the named workload.
    async fn open_tunnel(&self, workload: &str) -> anyhow::Result<Box<dyn Tunnel>>;
}

/// Owns a tunnel for the duration of a verification scope.
///
/// The tunnel is terminated when the guard drops, so every exit path of
/// the health-check stage tears it down: success, failure, or exhaustion.
pub struct TunnelGuard {
    tunnel: Box<dyn Tunnel>,
}

impl TunnelGuard {
    /// Wraps an open tunnel.
    #[must_use]
    pub fn new(tunnel: Box<dyn Tunnel>) -> Self {
        Self { tunnel }
    }

    /// Returns the tunnel's local endpoint.
    #[must_use]
    pub fn local_endpoint(&self) -> &str {
        self.tunnel.local_endpoint()
    }

    /// Closes the tunnel now instead of at drop.
    pub fn close(self) {
        // Drop runs the close.
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        debug!(endpoint = self.tunnel.local_endpoint(), "closing tunnel");
        self.tunnel.close();
    }
}

impl std::fmt::Debug for TunnelGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelGuard")
            .field("local_endpoint", &self.tunnel.local_endpoint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakeTunnel {
        endpoint: String,
        closed: Arc<AtomicBool>,
    }

    impl Tunnel for FakeTunnel {
        fn local_endpoint(&self) -> &str {
            &self.endpoint
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let closed = Arc::new(AtomicBool::new(false));
        {
            let _guard = TunnelGuard::new(Box::new(FakeTunnel {
                endpoint: "127.0.0.1:8080".to_string(),
                closed: closed.clone(),
            }));
            assert!(!closed.load(Ordering::SeqCst));
        }
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_guard_explicit_close() {
        let closed = Arc::new(AtomicBool::new(false));
        let guard = TunnelGuard::new(Box::new(FakeTunnel {
            endpoint: "127.0.0.1:8080".to_string(),
            closed: closed.clone(),
        }));

        assert_eq!(guard.local_endpoint(), "127.0.0.1:8080");
        guard.close();
        assert!(closed.load(Ordering::SeqCst));
    }
}
