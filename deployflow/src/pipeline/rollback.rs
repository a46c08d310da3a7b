//! Compensation execution for failed runs.
//!
//! Rollback follows saga semantics: compensations of already-succeeded
//! stages run in reverse completion order (most recently succeeded first).
//! A failing compensation is recorded and logged, and the remaining
//! compensations still run; nothing here ever replaces the original
//! pipeline error.

use crate::context::StageContext;
use crate::core::RollbackRecord;
use crate::events::{names, EventSink};
use crate::stages::Stage;
use std::sync::Arc;
use tracing::{error, info};

/// Runs the compensating actions of the given stages in reverse order.
///
/// `completed` must be the stages that succeeded, in completion order;
/// stages without a compensating action are skipped. Returns one record per
/// compensation invoked, in invocation order.
pub async fn run_rollback(
    completed: &[Arc<dyn Stage>],
    ctx: &StageContext,
    sink: &Arc<dyn EventSink>,
) -> Vec<RollbackRecord> {
    let compensating: Vec<&Arc<dyn Stage>> =
        completed.iter().rev().filter(|s| s.compensates()).collect();

    if compensating.is_empty() {
        return Vec::new();
    }

    sink.try_emit(
        names::ROLLBACK_STARTED,
        Some(serde_json::json!({ "stages": compensating.iter().map(|s| s.name()).collect::<Vec<_>>() })),
    );

    let mut records = Vec::with_capacity(compensating.len());
    for stage in compensating {
        match stage.compensate(ctx).await {
            Ok(()) => {
                info!(stage = stage.name(), "compensating action succeeded");
                sink.try_emit(
                    names::ROLLBACK_COMPENSATED,
                    Some(serde_json::json!({ "stage": stage.name() })),
                );
                records.push(RollbackRecord::compensated(stage.name()));
            }
            Err(e) => {
                error!(stage = stage.name(), error = %e, "compensating action failed");
                sink.try_emit(
                    names::ROLLBACK_FAILED,
                    Some(serde_json::json!({ "stage": stage.name(), "error": e.to_string() })),
                );
                records.push(RollbackRecord::failed(stage.name(), e.to_string()));
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RollbackOutcome, StageOutcome};
    use crate::events::CollectingEventSink;
    use crate::pipeline::RetryPolicy;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct Tracked {
        name: String,
        order: Arc<Mutex<Vec<String>>>,
        fail_compensation: bool,
    }

    #[async_trait]
    impl Stage for Tracked {
        fn name(&self) -> &str {
            &self.name
        }

        fn retry(&self) -> RetryPolicy {
            RetryPolicy::none()
        }

        async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
            StageOutcome::ok()
        }

        fn compensates(&self) -> bool {
            true
        }

        async fn compensate(&self, _ctx: &StageContext) -> anyhow::Result<()> {
            self.order.lock().push(self.name.clone());
            if self.fail_compensation {
                anyhow::bail!("compensation for {} failed", self.name);
            }
            Ok(())
        }
    }

    fn tracked(name: &str, order: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn Stage> {
        Arc::new(Tracked {
            name: name.to_string(),
            order: order.clone(),
            fail_compensation: fail,
        })
    }

    #[tokio::test]
    async fn test_reverse_completion_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let completed = vec![
            tracked("provision", &order, false),
            tracked("rollout", &order, false),
        ];
        let sink: Arc<dyn EventSink> = Arc::new(CollectingEventSink::new());

        let records = run_rollback(&completed, &StageContext::new(), &sink).await;

        assert_eq!(*order.lock(), vec!["rollout".to_string(), "provision".to_string()]);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.outcome == RollbackOutcome::Compensated));
    }

    #[tokio::test]
    async fn test_failed_compensation_does_not_stop_the_rest() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let completed = vec![
            tracked("provision", &order, false),
            tracked("rollout", &order, true),
        ];
        let sink: Arc<dyn EventSink> = Arc::new(CollectingEventSink::new());

        let records = run_rollback(&completed, &StageContext::new(), &sink).await;

        // rollout's compensation failed, provision's still ran.
        assert_eq!(*order.lock(), vec!["rollout".to_string(), "provision".to_string()]);
        assert_eq!(records[0].outcome, RollbackOutcome::Failed);
        assert_eq!(records[1].outcome, RollbackOutcome::Compensated);
    }

    #[tokio::test]
    async fn test_non_compensating_stages_skipped() {
        let completed: Vec<Arc<dyn Stage>> =
            vec![Arc::new(crate::stages::NoOpStage::new("push-image"))];
        let sink: Arc<dyn EventSink> = Arc::new(CollectingEventSink::new());

        let records = run_rollback(&completed, &StageContext::new(), &sink).await;

        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let completed = vec![tracked("rollout", &order, false)];
        let collecting = Arc::new(CollectingEventSink::new());
        let sink: Arc<dyn EventSink> = collecting.clone();

        run_rollback(&completed, &StageContext::new(), &sink).await;

        let types = collecting.event_types();
        assert_eq!(types, vec![names::ROLLBACK_STARTED, names::ROLLBACK_COMPENSATED]);
    }
}
