//! Well-known context keys, namespaced by producer.

/// Full commit hash of the revision being deployed.
pub const COMMIT_SHA: &str = "commit.sha";

/// Short commit hash used in image tags.
pub const COMMIT_SHORT: &str = "commit.short";

/// Monotonic build counter supplied by the build environment.
pub const BUILD_NUMBER: &str = "build.number";

/// Image registry base URL, produced by provisioning or supplied by the operator.
pub const REGISTRY_URL: &str = "registry.url";

/// Image tag derived from commit hash and build counter.
pub const IMAGE_TAG: &str = "image.tag";

/// Fully qualified image reference (`repository:tag`).
pub const IMAGE_REFERENCE: &str = "image.reference";

/// Cluster API endpoint, produced by provisioning.
pub const CLUSTER_ENDPOINT: &str = "cluster.endpoint";

/// Name of the workload being deployed.
pub const WORKLOAD_NAME: &str = "workload.name";

/// Content checksum of the manifest set last applied.
pub const MANIFESTS_CHECKSUM: &str = "manifests.checksum";

/// Image reference that was live before the rollout stage ran.
pub const PREVIOUS_IMAGE: &str = "rollout.previous_image";

/// Endpoint the health verifier probed.
pub const HEALTH_ENDPOINT: &str = "health.endpoint";

/// Number of probes the health verifier issued.
pub const HEALTH_PROBES: &str = "health.probes";
