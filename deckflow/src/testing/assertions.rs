//! Test assertions for jobs, presentations and event streams.

use crate::core::{JobStatus, Outline, Presentation};
use crate::events::{names, JobEvent};
use crate::jobs::JobStatusView;

/// Asserts that the job completed without degradation.
pub fn assert_job_completed(view: &JobStatusView) {
    assert_eq!(
        view.status,
        JobStatus::Completed,
        "Expected completed job, got {:?} with error {:?}",
        view.status,
        view.error
    );
    assert_eq!(view.progress.completion_percent, 100);
}

/// Asserts that the job failed with a message containing `needle`.
pub fn assert_job_failed(view: &JobStatusView, needle: &str) {
    assert_eq!(view.status, JobStatus::Error, "Expected failed job, got {:?}", view.status);
    let message = view.error.as_deref().unwrap_or_default();
    assert!(
        message.contains(needle),
        "Expected error containing '{needle}', got '{message}'"
    );
}

/// Asserts that slides are numbered `1..=n` in order.
pub fn assert_outline_numbered(outline: &Outline, n: usize) {
    let numbers: Vec<usize> = outline.slides.iter().map(|s| s.slide_number).collect();
    assert_eq!(numbers, (1..=n).collect::<Vec<_>>());
}

/// Asserts that presentation slides are numbered `1..=slide_count` in order.
pub fn assert_presentation_numbered(presentation: &Presentation) {
    let numbers: Vec<usize> = presentation.slides().iter().map(|s| s.slide_number).collect();
    assert_eq!(numbers, (1..=presentation.slide_count()).collect::<Vec<_>>());
}

/// Extracts the percents of `job.status` events in emission order.
#[must_use]
pub fn status_percents(events: &[JobEvent]) -> Vec<u64> {
    events
        .iter()
        .filter(|e| e.event_type == names::JOB_STATUS)
        .filter_map(|e| e.data["completion_percent"].as_u64())
        .collect()
}

/// Asserts that reported progress never decreases and hits 100 only at the end.
pub fn assert_progress_monotonic(events: &[JobEvent]) {
    let percents = status_percents(events);
    assert!(
        percents.windows(2).all(|w| w[0] <= w[1]),
        "Progress went backwards: {percents:?}"
    );
    if let Some((_, earlier)) = percents.split_last() {
        assert!(
            earlier.iter().all(|p| *p < 100),
            "Progress reached 100 before the end: {percents:?}"
        );
    }
}
