//! The per-job state machine.

use crate::cancellation::CancellationToken;
use crate::capabilities::{Collaborators, JobRecord, SpeechRequest};
use crate::config::{PipelineConfig, VoiceConfig};
use crate::core::{
    JobStatus, Presentation, PresentationBuilder, StageKind, TopicSpec, UsageAccountant,
    ValidationResult,
};
use crate::errors::DeckflowError;
use crate::events::{names, JobEmitter};
use crate::jobs::{Job, JobOptions, JobStatusView, JobStore};
use crate::observability::{
    job_payload, stage_payload, stage_started_payload, usage_payload, StageTimer,
};
use crate::refine::{LoopObserver, NoOpObserver};
use crate::stages::{ContentStage, ImageStage, OutlineStage, VoiceoverOutcome, VoiceoverStage};
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Everything one job task owns.
pub(crate) struct JobRunner {
    pub(crate) job_id: Uuid,
    pub(crate) topic: TopicSpec,
    pub(crate) options: JobOptions,
    pub(crate) voice: Option<VoiceConfig>,
    pub(crate) config: Arc<PipelineConfig>,
    pub(crate) collaborators: Collaborators,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) emitter: JobEmitter,
    pub(crate) token: Arc<CancellationToken>,
    pub(crate) tokens: Arc<DashMap<Uuid, Arc<CancellationToken>>>,
}

/// Outcome of one stage, reduced to what gets reported.
struct StageReport {
    stage: StageKind,
    slide: Option<usize>,
    attempts: usize,
    score: Option<i64>,
    exhausted: bool,
}

impl JobRunner {
    /// Runs the job to a terminal status and returns the final snapshot.
    pub(crate) async fn run(self) -> JobStatusView {
        let timer = StageTimer::start("job");
        let mut usage = UsageAccountant::new();

        let result = AssertUnwindSafe(self.generate(&mut usage, &timer))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(DeckflowError::Internal("job task panicked".to_string())));

        let view = match result {
            Ok(presentation) => self.finish_completed(presentation).await,
            Err(err) => self.finish_failed(err, &usage, timer.elapsed_ms()).await,
        };
        self.tokens.remove(&self.job_id);
        view
    }

    async fn generate(
        &self,
        usage: &mut UsageAccountant,
        timer: &StageTimer,
    ) -> Result<Presentation, DeckflowError> {
        let collaborators = &self.collaborators;
        let agentic = self.options.is_agentic;

        self.token.check()?;
        self.set_status(JobStatus::GeneratingOutline, usage).await?;
        self.stage_started(StageKind::Outline, None).await;
        let stage_timer = StageTimer::start("outline");
        let outline = OutlineStage::new(self.config.outline, agentic)
            .run(
                collaborators.outline.as_ref(),
                &self.topic,
                usage,
                &OutlinePhaseObserver { runner: self },
            )
            .await?;
        self.stage_finished(
            StageReport {
                stage: StageKind::Outline,
                slide: None,
                attempts: outline.attempts,
                score: outline.validation.as_ref().map(|v| v.score),
                exhausted: outline.exhausted,
            },
            &stage_timer,
            usage,
        )
        .await?;

        let outline = outline.artifact;
        info!(title = %outline.title, slides = outline.len(), "Outline ready");
        let mut builder = PresentationBuilder::new(self.job_id, self.topic.clone(), &outline.title);

        let content_stage = ContentStage::new(self.config.content, agentic);
        let image_stage = ImageStage::new(
            self.config.image,
            agentic,
            self.config.image_models.model_for(self.options.quality),
        );
        let voiceover_stage = VoiceoverStage::new(self.config.voiceover_failure_policy);

        for slide in &outline.slides {
            let n = slide.slide_number;
            self.token.check()?;
            self.set_status(JobStatus::Slide(n), usage).await?;

            self.stage_started(StageKind::Content, Some(n)).await;
            let stage_timer = StageTimer::start("content");
            let content = content_stage
                .run(
                    collaborators.content.as_ref(),
                    &outline.title,
                    slide,
                    usage,
                    &NoOpObserver,
                )
                .await?;
            self.stage_finished(
                StageReport {
                    stage: StageKind::Content,
                    slide: Some(n),
                    attempts: content.attempts,
                    score: content.validation.as_ref().map(|v| v.score),
                    exhausted: content.exhausted,
                },
                &stage_timer,
                usage,
            )
            .await?;

            self.token.check()?;
            self.stage_started(StageKind::Image, Some(n)).await;
            let stage_timer = StageTimer::start("image");
            let image = image_stage
                .run(
                    collaborators.image.as_ref(),
                    &content.artifact,
                    usage,
                    &NoOpObserver,
                )
                .await?;
            for candidate in &image.candidates {
                self.emitter
                    .emit(
                        names::IMAGE_CANDIDATE,
                        json!({
                            "slide": n,
                            "attempt": candidate.attempt_index,
                            "score": candidate.score,
                            "image": candidate.image.location(),
                            "selected": candidate.attempt_index == image.selected_attempt,
                        }),
                    )
                    .await;
            }
            self.stage_finished(
                StageReport {
                    stage: StageKind::Image,
                    slide: Some(n),
                    attempts: image.candidates.len(),
                    score: image.validation.as_ref().map(|v| v.score),
                    exhausted: image.exhausted,
                },
                &stage_timer,
                usage,
            )
            .await?;

            let audio = match (&self.voice, &collaborators.speech) {
                (Some(voice), Some(speech)) => {
                    self.token.check()?;
                    self.stage_started(StageKind::Voiceover, Some(n)).await;
                    let request = SpeechRequest {
                        job_id: self.job_id,
                        slide_number: n,
                        text: image.content.voiceover_text.clone(),
                        voice: voice.clone(),
                    };
                    let outcome = voiceover_stage.run(speech.as_ref(), &request).await?;
                    let skipped = matches!(outcome, VoiceoverOutcome::Skipped { .. });
                    self.emitter
                        .emit(
                            names::STAGE_COMPLETED,
                            json!({
                                "stage": StageKind::Voiceover.to_string(),
                                "slide": n,
                                "skipped": skipped,
                            }),
                        )
                        .await;
                    outcome.audio().cloned()
                }
                _ => None,
            };

            builder.push_slide(slide, image.content, &image.image, audio.as_ref())?;
            debug!(slide = n, "Slide assembled");
        }

        builder.build(usage.totals(), timer.elapsed_ms())
    }

    async fn set_status(&self, status: JobStatus, usage: &UsageAccountant) -> Result<(), DeckflowError> {
        let totals = usage.totals();
        let calls = usage.calls();
        let job = self.store.update(self.job_id, &mut |job: &mut Job| {
            job.transition(status);
            job.usage = totals;
            job.calls = calls;
        })?;
        self.emit_status(&job).await;
        Ok(())
    }

    async fn emit_status(&self, job: &Job) {
        info!(
            status = %job.status,
            percent = job.progress.completion_percent,
            "Job status changed"
        );
        self.emitter
            .emit(
                names::JOB_STATUS,
                json!({
                    "status": job.status.to_string(),
                    "current_step": job.progress.current_step,
                    "completion_percent": job.progress.completion_percent,
                }),
            )
            .await;
    }

    /// Sets an outline sub-status from a synchronous loop hook.
    fn set_outline_phase(&self, status: JobStatus) {
        match self
            .store
            .update(self.job_id, &mut |job: &mut Job| job.transition(status))
        {
            Ok(job) => {
                info!(
                    status = %job.status,
                    percent = job.progress.completion_percent,
                    "Job status changed"
                );
                self.emitter.try_emit(
                    names::JOB_STATUS,
                    json!({
                        "status": job.status.to_string(),
                        "current_step": job.progress.current_step,
                        "completion_percent": job.progress.completion_percent,
                    }),
                );
            }
            Err(e) => warn!(error = %e, "Failed to record outline phase"),
        }
    }

    async fn stage_started(&self, stage: StageKind, slide: Option<usize>) {
        debug!(stage = %stage, slide, "Stage started");
        self.emitter
            .emit(names::STAGE_STARTED, stage_started_payload(stage, slide))
            .await;
    }

    async fn stage_finished(
        &self,
        report: StageReport,
        timer: &StageTimer,
        usage: &UsageAccountant,
    ) -> Result<(), DeckflowError> {
        let payload = stage_payload(
            report.stage,
            report.slide,
            report.attempts,
            report.score,
            report.exhausted,
            timer.elapsed_ms(),
        );
        if report.exhausted {
            warn!(
                stage = %report.stage,
                slide = report.slide,
                score = report.score,
                "Fix rounds exhausted below threshold, keeping selected artifact"
            );
            self.emitter
                .emit(names::STAGE_POLICY_EXHAUSTED, payload.clone())
                .await;
        }
        self.emitter.emit(names::STAGE_COMPLETED, payload).await;

        let totals = usage.totals();
        let calls = usage.calls();
        self.store.update(self.job_id, &mut |job: &mut Job| {
            job.usage = totals;
            job.calls = calls;
        })?;
        Ok(())
    }

    async fn finish_completed(&self, presentation: Presentation) -> JobStatusView {
        let slides = presentation.slides().to_vec();
        let completed = self.store.update(self.job_id, &mut |job: &mut Job| {
            job.complete(presentation.clone());
        });
        let job = match completed {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to record completed job");
                return self.snapshot();
            }
        };
        self.emit_status(&job).await;
        info!(
            total_tokens = job.usage.total_tokens(),
            generation_time_ms = job.generation_time_ms,
            "Job completed"
        );
        self.emitter.emit(names::JOB_COMPLETED, job_payload(&job)).await;

        if let Some(store) = &self.collaborators.store {
            let record = self.job_record(&job);
            if let Err(e) = store.persist_job(&record).await {
                self.degrade(names::JOB_PERSIST_DEGRADED, format!("persist job failed: {e}"), &e)
                    .await;
            }
            if let Err(e) = store.persist_slides(self.job_id, &slides).await {
                self.degrade(
                    names::JOB_PERSIST_DEGRADED,
                    format!("persist slides failed: {e}"),
                    &e,
                )
                .await;
            }
        }

        if self.config.export_on_completion {
            if let (Some(exporter), Some(presentation)) =
                (&self.collaborators.exporter, job.presentation.as_ref())
            {
                match exporter.export_deck(presentation).await {
                    Ok(path) => info!(path = %path.display(), "Presentation exported"),
                    Err(e) => {
                        self.degrade(names::JOB_EXPORT_DEGRADED, format!("export failed: {e}"), &e)
                            .await;
                    }
                }
            }
        }

        self.snapshot()
    }

    async fn finish_failed(
        &self,
        err: DeckflowError,
        usage: &UsageAccountant,
        elapsed_ms: u64,
    ) -> JobStatusView {
        let cancelled = matches!(err, DeckflowError::Cancelled(_));
        if cancelled {
            info!(reason = %err, "Job cancelled");
        } else {
            error!(error = %err, kind = err.kind(), "Job failed");
        }

        let totals = usage.totals();
        let calls = usage.calls();
        let failed = self.store.update(self.job_id, &mut |job: &mut Job| {
            job.usage = totals;
            job.calls = calls;
            job.fail(err.clone(), elapsed_ms);
        });
        let job = match failed {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to record failed job");
                return self.snapshot();
            }
        };
        self.emit_status(&job).await;
        let event = if cancelled {
            names::JOB_CANCELLED
        } else {
            names::JOB_FAILED
        };
        let mut payload = job_payload(&job);
        payload["usage"] = usage_payload(usage);
        self.emitter.emit(event, payload).await;

        if let Some(store) = &self.collaborators.store {
            if let Err(e) = store.persist_job(&self.job_record(&job)).await {
                warn!(error = %e, "Failed to persist failed job history");
            }
        }
        self.snapshot()
    }

    async fn degrade(&self, event: &str, warning: String, err: &DeckflowError) {
        warn!(error = %err, "{}", warning);
        if let Err(e) = self
            .store
            .update(self.job_id, &mut |job: &mut Job| job.warnings.push(warning.clone()))
        {
            error!(error = %e, "Failed to record warning");
        }
        self.emitter.emit(event, err_payload(err)).await;
    }

    fn job_record(&self, job: &Job) -> JobRecord {
        JobRecord {
            job_id: self.job_id,
            topic: self.topic.topic.clone(),
            slide_count: self.topic.slide_count,
            client_id: self.options.client_id.clone(),
            status: job.status,
            usage: job.usage,
            generation_time_ms: job.generation_time_ms.unwrap_or_default(),
            created_at: job.created_at,
        }
    }

    fn snapshot(&self) -> JobStatusView {
        match self.store.get(self.job_id) {
            Ok(job) => job.status_view(),
            Err(e) => {
                error!(error = %e, "Job vanished from store");
                let mut job = Job::new(self.job_id, self.topic.clone(), self.options.clone());
                job.fail(e, 0);
                job.status_view()
            }
        }
    }
}

fn err_payload(err: &DeckflowError) -> serde_json::Value {
    json!(err.to_dict())
}

/// Reports outline validation and fix rounds as job sub-statuses.
struct OutlinePhaseObserver<'a> {
    runner: &'a JobRunner,
}

impl LoopObserver for OutlinePhaseObserver<'_> {
    fn on_validating(&self, attempt: usize) {
        if attempt == 1 {
            self.runner.set_outline_phase(JobStatus::TestingOutline);
        }
    }

    fn on_fixing(&self, round: usize, feedback: &ValidationResult) {
        debug!(round, score = feedback.score, "Fixing outline");
        self.runner.set_outline_phase(JobStatus::FixingOutline);
    }
}
