//! # Deployflow
//!
//! A deployment pipeline orchestration core.
//!
//! Deployflow provides the minimal engine needed to reproduce the
//! operational guarantees of a deployment pipeline without being tied to
//! any CI product:
//!
//! - **Ordered stage execution**: a single driver runs stages strictly in
//!   declaration order, passing data through a shared context
//! - **Bounded retry**: per-stage attempt budgets with fixed or linear
//!   backoff; structural failures are never retried
//! - **Rollback**: compensating actions of succeeded stages run in reverse
//!   completion order when a run fails
//! - **Health verification**: a bounded-probe state machine with an
//!   ephemeral tunnel fallback for slow load balancers
//! - **Collaborator boundaries**: provisioner, registry, cluster, and
//!   secret store stay behind traits; the core orchestrates, never
//!   implements
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deployflow::prelude::*;
//!
//! let pipeline = Pipeline::builder("deploy")
//!     .stage(Arc::new(ProvisionStage::new(provisioner).expecting([keys::REGISTRY_URL])))
//!     .stage(Arc::new(PushImageStage::new(registry).with_retry(RetryPolicy::fixed(3, 5_000))))
//!     .stage(Arc::new(RolloutStage::new(cluster, Duration::from_secs(120))))
//!     .stage(Arc::new(HealthCheckStage::new(verifier)))
//!     .config(config)
//!     .build()?;
//!
//! let report = pipeline.run().await;
//! std::process::exit(report.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod deploy;
pub mod errors;
pub mod events;
pub mod health;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, CleanupGuard};
    pub use crate::config::ExternalConfig;
    pub use crate::context::{keys, ContextResolver, StageContext, ValueSource};
    pub use crate::core::{
        PipelineReport, PipelineStatus, RollbackOutcome, RollbackRecord, StageOutcome,
        StageRecord, StageStatus,
    };
    pub use crate::deploy::{
        ApplyManifestsStage, ClusterControlPlane, HealthCheckStage, ImageRef, ImageRegistry,
        InfraProvisioner, Manifest, ManifestSet, ProvisionStage, PushImageStage,
        ResourceOutputs, RolloutStage, SecretStore, SecretString,
    };
    pub use crate::errors::{
        DeployError, ErrorCategory, HealthCheckExhausted, MissingContextValue,
        PipelineValidationError, RollbackError, StageExecutionError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::health::{
        EndpointResolver, ExhaustionSeverity, HealthProbe, HealthState, HealthVerdict,
        HealthVerifier, ProbeConfig, Tunnel, TunnelGuard, TunnelProvider,
    };
    pub use crate::pipeline::{
        Backoff, Jitter, NoOpHooks, Pipeline, PipelineBuilder, PipelineHooks, RetryPolicy,
    };
    pub use crate::stages::{FnStage, NoOpStage, Stage};
}

#[cfg(test)]
mod tests {
    #[test]
    fn library_compiles() {
        assert!(true);
    }
}
