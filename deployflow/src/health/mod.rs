//! Health verification for freshly deployed workloads.
//!
//! This module provides:
//! - The verification state machine (`AwaitingEndpoint -> ProbingHealth ->
//!   Healthy | Exhausted`)
//! - Endpoint resolution with an ephemeral tunnel fallback
//! - The health-check stage with configurable exhaustion severity

mod stage;
mod state;
mod tunnel;
mod verifier;

pub use stage::{ExhaustionSeverity, HealthCheckStage};
pub use state::HealthState;
pub use tunnel::{Tunnel, TunnelGuard, TunnelProvider};
pub use verifier::{EndpointResolver, HealthProbe, HealthVerdict, HealthVerifier, ProbeConfig};
