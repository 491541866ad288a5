//! Job state, options and progress.

use crate::config::{PipelineConfig, VoiceConfig};
use crate::core::{JobStatus, Presentation, QualityTier, TopicSpec, UsageCounters};
use crate::errors::DeckflowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Percent reported once the outline phase is over.
pub const OUTLINE_PHASE_PERCENT: u8 = 30;

/// Caller-selected options for one job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Image quality tier.
    pub quality: QualityTier,
    /// Whether validate and fix calls run.
    pub is_agentic: bool,
    /// Whether narration is synthesized per slide.
    pub generate_voiceover: bool,
    /// Voice to narrate with. Falls back to the configured default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Submitting organization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_code: Option<String>,
    /// Submitting client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl JobOptions {
    /// Creates default options: medium quality, single-shot, no voiceover.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the quality tier.
    #[must_use]
    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    /// Enables or disables validate and fix calls.
    #[must_use]
    pub fn with_agentic(mut self, is_agentic: bool) -> Self {
        self.is_agentic = is_agentic;
        self
    }

    /// Requests voiceover, optionally with an explicit voice.
    #[must_use]
    pub fn with_voiceover(mut self, voice_id: Option<String>) -> Self {
        self.generate_voiceover = true;
        self.voice_id = voice_id;
        self
    }

    /// Sets the submitting client.
    #[must_use]
    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the submitting organization.
    #[must_use]
    pub fn with_organization(mut self, organization_code: impl Into<String>) -> Self {
        self.organization_code = Some(organization_code.into());
        self
    }

    /// Resolves the voice for this job, or `None` when voiceover is off.
    pub fn resolve_voice(&self, config: &PipelineConfig) -> Result<Option<VoiceConfig>, DeckflowError> {
        if !self.generate_voiceover {
            return Ok(None);
        }
        let voice_id = self
            .voice_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| config.default_voice_id.clone())
            .ok_or_else(|| {
                DeckflowError::InvalidInput(
                    "voiceover requested but no voice id given or configured".to_string(),
                )
            })?;
        Ok(Some(VoiceConfig {
            voice_id,
            settings: config.voice_settings,
        }))
    }
}

/// Reported progress of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Step name, e.g. `testing_outline` or `slide_3`.
    pub current_step: String,
    /// Whole percent, 0 to 100.
    pub completion_percent: u8,
    /// 1-based slide being processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_slide: Option<usize>,
    /// Slides in the presentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_slides: Option<usize>,
}

impl JobProgress {
    fn step(step: impl Into<String>, percent: u8) -> Self {
        Self {
            current_step: step.into(),
            completion_percent: percent,
            current_slide: None,
            total_slides: None,
        }
    }

    /// Progress for a status. `Error` keeps the last reported percent.
    #[must_use]
    pub fn for_status(status: &JobStatus, total_slides: usize, last_percent: u8) -> Self {
        match status {
            JobStatus::Queued => Self::step("queued", 0),
            JobStatus::GeneratingOutline => Self::step("outline", 0),
            JobStatus::TestingOutline => Self::step("testing_outline", 10),
            JobStatus::FixingOutline => Self::step("fixing_outline", 20),
            JobStatus::Slide(n) => Self {
                current_step: status.to_string(),
                completion_percent: slide_percent(*n, total_slides),
                current_slide: Some(*n),
                total_slides: Some(total_slides),
            },
            JobStatus::Completed => Self::step("completed", 100),
            JobStatus::Error => Self::step("error", last_percent),
        }
    }
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::step("queued", 0)
    }
}

/// Percent reported while working on 1-based slide `n` of `total`.
///
/// Slides share the 70 points after the outline phase, rounded down.
#[must_use]
pub fn slide_percent(n: usize, total: usize) -> u8 {
    if total == 0 {
        return OUTLINE_PHASE_PERCENT;
    }
    let done = n.saturating_sub(1).min(total);
    let share = done * 70 / total;
    OUTLINE_PHASE_PERCENT + u8::try_from(share).unwrap_or(70)
}

/// Terminal or pending result of a job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The job has not finished.
    Pending(JobStatus),
    /// The job completed.
    Completed(Presentation),
    /// The job failed.
    Failed(DeckflowError),
}

impl JobOutcome {
    /// Converts into the presentation or the job's error.
    ///
    /// A pending job yields `None`.
    pub fn into_result(self) -> Option<Result<Presentation, DeckflowError>> {
        match self {
            Self::Pending(_) => None,
            Self::Completed(presentation) => Some(Ok(presentation)),
            Self::Failed(err) => Some(Err(err)),
        }
    }
}

/// A generation job.
#[derive(Debug, Clone)]
pub struct Job {
    /// Job id.
    pub id: Uuid,
    /// Requested topic.
    pub topic: TopicSpec,
    /// Options it was submitted with.
    pub options: JobOptions,
    /// Current status.
    pub status: JobStatus,
    /// Current progress.
    pub progress: JobProgress,
    /// Running usage totals.
    pub usage: UsageCounters,
    /// Metered calls so far.
    pub calls: usize,
    /// The presentation once completed.
    pub presentation: Option<Presentation>,
    /// The failure once errored.
    pub failure: Option<DeckflowError>,
    /// Degradations reported after completion.
    pub warnings: Vec<String>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Wall-clock run time once terminal.
    pub generation_time_ms: Option<u64>,
}

impl Job {
    /// Creates a queued job.
    #[must_use]
    pub fn new(id: Uuid, topic: TopicSpec, options: JobOptions) -> Self {
        let now = Utc::now();
        Self {
            id,
            topic,
            options,
            status: JobStatus::Queued,
            progress: JobProgress::default(),
            usage: UsageCounters::default(),
            calls: 0,
            presentation: None,
            failure: None,
            warnings: Vec::new(),
            created_at: now,
            updated_at: now,
            generation_time_ms: None,
        }
    }

    /// Moves to `status` and derives the matching progress.
    pub fn transition(&mut self, status: JobStatus) {
        self.progress = JobProgress::for_status(
            &status,
            self.topic.slide_count,
            self.progress.completion_percent,
        );
        self.status = status;
    }

    /// Marks the job completed with its presentation.
    pub fn complete(&mut self, presentation: Presentation) {
        self.usage = presentation.usage();
        self.generation_time_ms = Some(presentation.generation_time_ms());
        self.presentation = Some(presentation);
        self.transition(JobStatus::Completed);
    }

    /// Marks the job failed.
    pub fn fail(&mut self, error: DeckflowError, generation_time_ms: u64) {
        self.failure = Some(error);
        self.generation_time_ms = Some(generation_time_ms);
        self.presentation = None;
        self.transition(JobStatus::Error);
    }

    /// Returns the error message of a failed job.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }

    /// Returns the job's result.
    #[must_use]
    pub fn outcome(&self) -> JobOutcome {
        match (&self.status, &self.presentation, &self.failure) {
            (JobStatus::Completed, Some(presentation), _) => {
                JobOutcome::Completed(presentation.clone())
            }
            (JobStatus::Error, _, Some(err)) => JobOutcome::Failed(err.clone()),
            (JobStatus::Error, _, None) => {
                JobOutcome::Failed(DeckflowError::Internal("job failed without an error".into()))
            }
            (status, _, _) => JobOutcome::Pending(*status),
        }
    }

    /// Returns a polling snapshot.
    #[must_use]
    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            status: self.status,
            progress: self.progress.clone(),
            usage: self.usage,
            calls: self.calls,
            error: self.error_message(),
            warnings: self.warnings.clone(),
        }
    }
}

/// What status polling returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    /// Job id.
    pub job_id: Uuid,
    /// Current status.
    pub status: JobStatus,
    /// Current progress.
    pub progress: JobProgress,
    /// Usage so far.
    pub usage: UsageCounters,
    /// Metered calls so far.
    pub calls: usize,
    /// Error message when the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Persistence or export degradations of a completed job.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl JobStatusView {
    /// Returns true if the job completed but persistence or export degraded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.status == JobStatus::Completed && !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slide_percent_rounds_down() {
        assert_eq!(slide_percent(1, 5), 30);
        assert_eq!(slide_percent(2, 5), 44);
        assert_eq!(slide_percent(3, 3), 76);
        assert_eq!(slide_percent(2, 3), 53);
        assert!(slide_percent(15, 15) < 100);
    }

    #[test]
    fn test_progress_for_outline_phase() {
        let steps: Vec<(String, u8)> = [
            JobStatus::GeneratingOutline,
            JobStatus::TestingOutline,
            JobStatus::FixingOutline,
            JobStatus::Slide(1),
        ]
        .iter()
        .map(|s| {
            let p = JobProgress::for_status(s, 4, 0);
            (p.current_step, p.completion_percent)
        })
        .collect();

        assert_eq!(
            steps,
            vec![
                ("outline".to_string(), 0),
                ("testing_outline".to_string(), 10),
                ("fixing_outline".to_string(), 20),
                ("slide_1".to_string(), 30),
            ]
        );
    }

    #[test]
    fn test_error_keeps_last_percent() {
        let mut job = Job::new(Uuid::new_v4(), TopicSpec::new("Bees", 4), JobOptions::new());
        job.transition(JobStatus::Slide(3));
        job.fail(DeckflowError::transport("image", "timeout"), 1200);

        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.progress.completion_percent, 65);
        assert_eq!(job.progress.current_step, "error");
        assert_eq!(
            job.status_view().error.as_deref(),
            Some("Transport error in image: timeout")
        );
        assert!(matches!(job.outcome(), JobOutcome::Failed(_)));
    }

    #[test]
    fn test_pending_outcome() {
        let job = Job::new(Uuid::new_v4(), TopicSpec::new("Bees", 2), JobOptions::new());
        assert!(job.outcome().into_result().is_none());
    }

    #[test]
    fn test_voice_resolution() {
        let config = PipelineConfig::default().with_default_voice("narrator");

        assert_eq!(JobOptions::new().resolve_voice(&config).unwrap(), None);

        let explicit = JobOptions::new()
            .with_voiceover(Some("guest".into()))
            .resolve_voice(&config)
            .unwrap()
            .unwrap();
        assert_eq!(explicit.voice_id, "guest");

        let fallback = JobOptions::new()
            .with_voiceover(None)
            .resolve_voice(&config)
            .unwrap()
            .unwrap();
        assert_eq!(fallback.voice_id, "narrator");
        assert_eq!(fallback.settings, config.voice_settings);

        let err = JobOptions::new()
            .with_voiceover(None)
            .resolve_voice(&PipelineConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: JobOptions =
            serde_json::from_value(serde_json::json!({"quality": "high", "is_agentic": true}))
                .unwrap();
        assert_eq!(options.quality, QualityTier::High);
        assert!(options.is_agentic);
        assert!(!options.generate_voiceover);
    }
}
