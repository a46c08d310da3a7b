//! Collaborator boundaries and the built-in deployment stages.
//!
//! Everything the pipeline orchestrates but does not implement lives behind
//! a trait here: the infrastructure provisioner, the image registry, the
//! cluster control plane, and the credential store. The built-in stages
//! compose these boundaries into the standard provision / push / apply /
//! rollout / verify sequence.

mod cluster;
mod provisioner;
mod registry;
mod secrets;

pub use cluster::{
    ApplyManifestsStage, ClusterControlPlane, Manifest, ManifestSet, RolloutStage,
};
pub use provisioner::{InfraProvisioner, ProvisionStage, ResourceOutputs};
pub use registry::{ImageRef, ImageRegistry, PushImageStage};
pub use secrets::{SecretStore, SecretString};

pub use crate::health::HealthCheckStage;
