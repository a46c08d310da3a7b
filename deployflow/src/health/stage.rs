//! The health-check stage.

use super::verifier::{HealthVerifier, HealthVerdict};
use crate::context::{keys, StageContext};
use crate::core::StageOutcome;
use crate::errors::ErrorCategory;
use crate::stages::Stage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How exhaustion of the probe budget is treated.
///
/// Fatal is the default: silently shipping an unhealthy deployment is a
/// correctness risk, so the lenient variant must be chosen explicitly by
/// the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionSeverity {
    /// Exhaustion fails the stage and triggers rollback.
    #[default]
    Fatal,
    /// Exhaustion is recorded in the report and the pipeline continues.
    Advisory,
}

/// Confirms the deployed workload is reachable and healthy before the
/// pipeline reports success.
///
/// The probe budget lives inside the verifier; the stage itself never
/// retries, so one pipeline run issues at most `max_probes` probes.
#[derive(Debug)]
pub struct HealthCheckStage {
    verifier: HealthVerifier,
    severity: ExhaustionSeverity,
}

impl HealthCheckStage {
    /// Creates a health-check stage with fatal exhaustion.
    #[must_use]
    pub fn new(verifier: HealthVerifier) -> Self {
        Self {
            verifier,
            severity: ExhaustionSeverity::Fatal,
        }
    }

    /// Sets the exhaustion severity.
    #[must_use]
    pub fn with_severity(mut self, severity: ExhaustionSeverity) -> Self {
        self.severity = severity;
        self
    }

    fn exhaustion_message(workload: &str, verdict: &HealthVerdict) -> String {
        if verdict.probes_attempted == 0 {
            format!("no reachable endpoint for workload '{workload}'")
        } else {
            format!(
                "workload '{workload}' never became healthy after {} probe(s)",
                verdict.probes_attempted
            )
        }
    }
}

#[async_trait]
impl Stage for HealthCheckStage {
    fn name(&self) -> &str {
        "verify-health"
    }

    fn requires(&self) -> Vec<String> {
        vec![keys::WORKLOAD_NAME.to_string()]
    }

    fn provides(&self) -> Vec<String> {
        vec![keys::HEALTH_ENDPOINT.to_string(), keys::HEALTH_PROBES.to_string()]
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        let Some(workload) = ctx.get(keys::WORKLOAD_NAME) else {
            return StageOutcome::fail_fatal(format!("context key '{}' missing", keys::WORKLOAD_NAME));
        };

        let verdict = self.verifier.verify(&workload).await;

        if verdict.is_healthy() {
            let mut outcome =
                StageOutcome::ok().with_value(keys::HEALTH_PROBES, verdict.probes_attempted.to_string());
            if let Some(endpoint) = &verdict.endpoint {
                outcome = outcome.with_value(keys::HEALTH_ENDPOINT, endpoint);
            }
            if verdict.used_tunnel {
                outcome = outcome
                    .with_advisory("load balancer endpoint unavailable; probed through local tunnel");
            }
            return outcome;
        }

        let message = Self::exhaustion_message(&workload, &verdict);
        match self.severity {
            ExhaustionSeverity::Fatal => {
                StageOutcome::fail_fatal(message).with_category(ErrorCategory::HealthCheck)
            }
            ExhaustionSeverity::Advisory => StageOutcome::ok().with_advisory(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{EndpointResolver, HealthProbe, ProbeConfig};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct FixedResolver(Option<String>);

    #[async_trait]
    impl EndpointResolver for FixedResolver {
        async fn resolve_endpoint(&self, _workload: &str) -> anyhow::Result<Option<String>> {
            Ok(self.0.clone())
        }
    }

    struct ScriptProbe(Mutex<Vec<bool>>);

    #[async_trait]
    impl HealthProbe for ScriptProbe {
        async fn probe(&self, _endpoint: &str) -> anyhow::Result<()> {
            let mut script = self.0.lock();
            let ok = if script.is_empty() { false } else { script.remove(0) };
            if ok {
                Ok(())
            } else {
                anyhow::bail!("503")
            }
        }
    }

    fn verifier(script: Vec<bool>, max_probes: u32) -> HealthVerifier {
        HealthVerifier::new(
            Arc::new(FixedResolver(Some("lb.example.com".to_string()))),
            Arc::new(ScriptProbe(Mutex::new(script))),
            ProbeConfig {
                max_probes,
                interval_ms: 1,
                endpoint_wait_ms: 5,
                endpoint_poll_ms: 1,
            },
        )
    }

    fn ctx_with_workload() -> StageContext {
        let ctx = StageContext::new();
        ctx.set(keys::WORKLOAD_NAME, "tasks-api");
        ctx
    }

    #[tokio::test]
    async fn test_healthy_writes_probe_data() {
        let stage = HealthCheckStage::new(verifier(vec![true], 3));

        let outcome = stage.execute(&ctx_with_workload()).await;

        assert!(outcome.is_success());
        let delta: std::collections::HashMap<_, _> = outcome.delta.into_iter().collect();
        assert_eq!(delta.get(keys::HEALTH_PROBES), Some(&"1".to_string()));
        assert_eq!(delta.get(keys::HEALTH_ENDPOINT), Some(&"lb.example.com".to_string()));
    }

    #[tokio::test]
    async fn test_exhaustion_is_fatal_by_default() {
        let stage = HealthCheckStage::new(verifier(vec![], 2));

        let outcome = stage.execute(&ctx_with_workload()).await;

        assert!(outcome.is_failure());
        assert!(!outcome.retryable);
        assert_eq!(outcome.category, Some(ErrorCategory::HealthCheck));
        assert!(outcome.error_message().contains("2 probe(s)"));
    }

    #[tokio::test]
    async fn test_advisory_exhaustion_continues() {
        let stage = HealthCheckStage::new(verifier(vec![], 2))
            .with_severity(ExhaustionSeverity::Advisory);

        let outcome = stage.execute(&ctx_with_workload()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.advisories.len(), 1);
        assert!(outcome.advisories[0].contains("never became healthy"));
    }

    #[tokio::test]
    async fn test_missing_workload_is_fatal() {
        let stage = HealthCheckStage::new(verifier(vec![true], 1));

        let outcome = stage.execute(&StageContext::new()).await;

        assert!(outcome.is_failure());
        assert!(!outcome.retryable);
    }

    #[test]
    fn test_severity_default() {
        assert_eq!(ExhaustionSeverity::default(), ExhaustionSeverity::Fatal);
    }
}
