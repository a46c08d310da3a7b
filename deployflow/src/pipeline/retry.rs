//! Per-stage retry policy and the bounded retry wrapper.
//!
//! Attempt counts and delays are configuration, never constants: the
//! observed deployment behavior (a handful of attempts with a fixed wait)
//! is just a policy instance, not baked in.

use crate::context::StageContext;
use crate::core::StageOutcome;
use crate::stages::Stage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// delay = base (constant between attempts)
    #[default]
    Fixed,
    /// delay = base * attempt (1-indexed)
    Linear,
}

/// Optional jitter applied to each delay.
///
/// Defaults to `None` so runs are reproducible; enable `Full` only when many
/// pipelines may contend for the same collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    /// No jitter.
    #[default]
    None,
    /// Random from 0 to the computed delay.
    Full,
}

/// Retry policy for a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum action invocations, including the first. Always >= 1.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Backoff shape.
    pub backoff: Backoff,
    /// Jitter applied to each delay.
    pub jitter: Jitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A policy of exactly one attempt with no delay.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            backoff: Backoff::Fixed,
            jitter: Jitter::None,
        }
    }

    /// A fixed-delay policy.
    ///
    /// `max_attempts` is clamped to at least 1: no stage may retry
    /// indefinitely, and every stage runs at least once.
    #[must_use]
    pub fn fixed(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            backoff: Backoff::Fixed,
            jitter: Jitter::None,
        }
    }

    /// A linear-backoff policy.
    #[must_use]
    pub fn linear(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            backoff: Backoff::Linear,
            jitter: Jitter::None,
        }
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay before the next attempt.
    ///
    /// `attempt` is the 1-indexed number of the attempt that just failed.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms;
        let delay = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Linear => base.saturating_mul(u64::from(attempt)),
        };

        let jittered = match self.jitter {
            Jitter::None => delay,
            Jitter::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Result of running a stage action through its retry budget.
#[derive(Debug)]
pub struct RetryResult {
    /// The final outcome (success, or the last failure).
    pub outcome: StageOutcome,
    /// How many times the action was invoked.
    pub attempts: u32,
}

/// Executes a stage's action up to its configured attempt limit.
///
/// Transient failures are retried after the policy's delay; structural
/// (non-retryable) failures surface immediately regardless of remaining
/// attempts. Side effects occur once per attempt, which is safe because
/// actions are idempotent by contract.
pub async fn execute_with_retry(stage: &dyn Stage, ctx: &StageContext) -> RetryResult {
    let policy = stage.retry();
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = stage.execute(ctx).await;

        if outcome.is_success() {
            return RetryResult { outcome, attempts: attempt };
        }

        if !outcome.retryable {
            return RetryResult { outcome, attempts: attempt };
        }

        if attempt >= max_attempts {
            return RetryResult { outcome, attempts: attempt };
        }

        let delay = policy.delay_for(attempt);
        warn!(
            stage = stage.name(),
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = outcome.error_message(),
            "stage attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::FnStage;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn flaky(name: &str, failures: u32, counter: Arc<AtomicU32>) -> FnStage {
        FnStage::new(name, move |_ctx| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= failures {
                    StageOutcome::fail(format!("transient failure {n}"))
                } else {
                    StageOutcome::ok()
                }
            }
        })
    }

    #[test]
    fn test_policy_none() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay_ms, 0);
    }

    #[test]
    fn test_max_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::fixed(0, 100).max_attempts, 1);
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(5, 100);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(4), Duration::from_millis(100));
    }

    #[test]
    fn test_linear_delay() {
        let policy = RetryPolicy::linear(5, 100);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
    }

    #[test]
    fn test_full_jitter_bounded() {
        let policy = RetryPolicy::fixed(3, 100).with_jitter(Jitter::Full);
        for _ in 0..20 {
            assert!(policy.delay_for(1) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_policy_serde() {
        let policy = RetryPolicy::linear(5, 30_000);
        let json = serde_json::to_string(&policy).unwrap();
        let back: RetryPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let stage = flaky("s", 0, counter.clone()).with_retry(RetryPolicy::fixed(3, 1));

        let result = execute_with_retry(&stage, &StageContext::new()).await;

        assert!(result.outcome.is_success());
        assert_eq!(result.attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let stage = flaky("s", 2, counter.clone()).with_retry(RetryPolicy::fixed(3, 1));

        let result = execute_with_retry(&stage, &StageContext::new()).await;

        assert!(result.outcome.is_success());
        assert_eq!(result.attempts, 3);
        // Side effect occurred exactly three times, not fewer, not more.
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_stops_at_budget() {
        let counter = Arc::new(AtomicU32::new(0));
        let stage = flaky("s", u32::MAX, counter.clone()).with_retry(RetryPolicy::fixed(2, 1));

        let result = execute_with_retry(&stage, &StageContext::new()).await;

        assert!(result.outcome.is_failure());
        assert_eq!(result.attempts, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fatal_failure_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_inner = counter.clone();
        let stage = FnStage::new("s", move |_ctx| {
            let counter = counter_inner.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StageOutcome::fail_fatal("manifest rejected")
            }
        })
        .with_retry(RetryPolicy::fixed(5, 1));

        let result = execute_with_retry(&stage, &StageContext::new()).await;

        assert!(result.outcome.is_failure());
        assert_eq!(result.attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
