//! Event emission for observability.
//!
//! The driver reports every pipeline, stage, rollback, and probe transition
//! through an [`EventSink`]; a global default sink can be installed for
//! processes that do not thread a sink explicitly.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use parking_lot::RwLock;
use std::sync::Arc;

/// Event type names emitted by the driver.
pub mod names {
    /// Pipeline run started.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// Every stage succeeded.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// The run failed (stage failure or abort).
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// A stage began executing.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage attempt failed and will be retried.
    pub const STAGE_RETRYING: &str = "stage.retrying";
    /// A stage completed successfully.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage failed past its retry budget.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// Rollback of succeeded stages began.
    pub const ROLLBACK_STARTED: &str = "rollback.started";
    /// One compensating action ran successfully.
    pub const ROLLBACK_COMPENSATED: &str = "rollback.compensated";
    /// One compensating action failed.
    pub const ROLLBACK_FAILED: &str = "rollback.failed";
}

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Installs the global default event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Removes the global default event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Returns the global event sink, or a [`NoOpEventSink`] if none is set.
#[must_use]
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}
