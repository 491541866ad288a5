//! Jobs: state, progress reporting and storage.

mod job;
mod store;

pub use job::{
    slide_percent, Job, JobOptions, JobOutcome, JobProgress, JobStatusView, OUTLINE_PHASE_PERCENT,
};
pub use store::{InMemoryJobStore, JobStore};
