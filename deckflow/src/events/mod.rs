//! Job lifecycle events.
//!
//! Events carry a dotted type name, the job id and a JSON payload. Sinks are
//! injected per orchestrator; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Event type names emitted by the orchestrator.
pub mod names {
    /// A job was accepted.
    pub const JOB_QUEUED: &str = "job.queued";
    /// A job changed status.
    pub const JOB_STATUS: &str = "job.status";
    /// A job completed.
    pub const JOB_COMPLETED: &str = "job.completed";
    /// A job failed.
    pub const JOB_FAILED: &str = "job.failed";
    /// A job was cancelled.
    pub const JOB_CANCELLED: &str = "job.cancelled";
    /// Persisting a finished job failed.
    pub const JOB_PERSIST_DEGRADED: &str = "job.persist_degraded";
    /// Exporting a finished job failed.
    pub const JOB_EXPORT_DEGRADED: &str = "job.export_degraded";
    /// A stage started.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage completed.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage ran out of fix rounds and kept a below-threshold artifact.
    pub const STAGE_POLICY_EXHAUSTED: &str = "stage.policy_exhausted";
    /// One image candidate was scored.
    pub const IMAGE_CANDIDATE: &str = "image.candidate";
}

/// One emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Dotted event type, see [`names`].
    pub event_type: String,
    /// Job the event belongs to.
    pub job_id: Uuid,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub data: serde_json::Value,
}

impl JobEvent {
    /// Creates an event stamped now.
    #[must_use]
    pub fn new(event_type: impl Into<String>, job_id: Uuid, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            job_id,
            timestamp: Utc::now(),
            data,
        }
    }
}

/// A sink bound to one job id.
#[derive(Clone)]
pub struct JobEmitter {
    sink: Arc<dyn EventSink>,
    job_id: Uuid,
}

impl JobEmitter {
    /// Binds a sink to a job.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, job_id: Uuid) -> Self {
        Self { sink, job_id }
    }

    /// Emits an event for the bound job.
    pub async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.sink
            .emit(&JobEvent::new(event_type, self.job_id, data))
            .await;
    }

    /// Emits without awaiting. Used from synchronous observer hooks.
    pub fn try_emit(&self, event_type: &str, data: serde_json::Value) {
        self.sink
            .try_emit(&JobEvent::new(event_type, self.job_id, data));
    }
}

impl std::fmt::Debug for JobEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEmitter")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}
