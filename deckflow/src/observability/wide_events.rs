//! Payload builders for lifecycle events.

use crate::core::{StageKind, UsageAccountant};
use crate::jobs::Job;
use serde_json::{json, Value};

/// Builds the payload of `stage.completed` and `stage.policy_exhausted`.
#[must_use]
pub fn stage_payload(
    stage: StageKind,
    slide_number: Option<usize>,
    attempts: usize,
    score: Option<i64>,
    exhausted: bool,
    duration_ms: u64,
) -> Value {
    let mut payload = json!({
        "stage": stage.to_string(),
        "attempts": attempts,
        "exhausted": exhausted,
        "duration_ms": duration_ms,
    });
    if let Some(slide) = slide_number {
        payload["slide"] = json!(slide);
    }
    if let Some(score) = score {
        payload["score"] = json!(score);
    }
    payload
}

/// Builds the payload of `stage.started`.
#[must_use]
pub fn stage_started_payload(stage: StageKind, slide_number: Option<usize>) -> Value {
    let mut payload = json!({ "stage": stage.to_string() });
    if let Some(slide) = slide_number {
        payload["slide"] = json!(slide);
    }
    payload
}

/// Builds the usage block shared by job events.
#[must_use]
pub fn usage_payload(usage: &UsageAccountant) -> Value {
    let totals = usage.totals();
    json!({
        "input_tokens": totals.input_tokens,
        "output_tokens": totals.output_tokens,
        "total_tokens": totals.total_tokens(),
        "calls": usage.calls(),
    })
}

/// Builds the payload of terminal job events from a job snapshot.
#[must_use]
pub fn job_payload(job: &Job) -> Value {
    let mut payload = json!({
        "status": job.status.to_string(),
        "topic": job.topic.topic,
        "slide_count": job.topic.slide_count,
        "completion_percent": job.progress.completion_percent,
        "input_tokens": job.usage.input_tokens,
        "output_tokens": job.usage.output_tokens,
        "total_tokens": job.usage.total_tokens(),
        "calls": job.calls,
    });
    if let Some(ms) = job.generation_time_ms {
        payload["generation_time_ms"] = json!(ms);
    }
    if let Some(error) = job.error_message() {
        payload["error"] = json!(error);
    }
    if !job.warnings.is_empty() {
        payload["warnings"] = json!(job.warnings);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TopicSpec, UsageDelta};
    use crate::errors::DeckflowError;
    use crate::jobs::JobOptions;
    use uuid::Uuid;

    #[test]
    fn test_stage_payload_optional_fields() {
        let outline = stage_payload(StageKind::Outline, None, 2, Some(70), true, 15);
        assert_eq!(outline["stage"], "outline");
        assert_eq!(outline["exhausted"], true);
        assert!(outline.get("slide").is_none());

        let image = stage_payload(StageKind::Image, Some(3), 1, None, false, 4);
        assert_eq!(image["slide"], 3);
        assert!(image.get("score").is_none());
    }

    #[test]
    fn test_usage_payload_totals() {
        let mut usage = UsageAccountant::new();
        usage.add(UsageDelta::new(10, 5));
        usage.add(UsageDelta::new(1, 1));
        let payload = usage_payload(&usage);
        assert_eq!(payload["total_tokens"], 17);
        assert_eq!(payload["calls"], 2);
    }

    #[test]
    fn test_job_payload_includes_error() {
        let mut job = Job::new(Uuid::new_v4(), TopicSpec::new("Bees", 2), JobOptions::new());
        job.fail(DeckflowError::transport("outline", "down"), 40);
        let payload = job_payload(&job);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["generation_time_ms"], 40);
        assert_eq!(payload["error"], "Transport error in outline: down");
    }
}
