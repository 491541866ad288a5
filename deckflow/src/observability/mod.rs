//! Observability utilities.

mod tracing;
mod wide_events;

pub use self::tracing::{init_tracing, job_span, LogFormat, StageTimer};
pub use wide_events::{job_payload, stage_payload, stage_started_payload, usage_payload};
