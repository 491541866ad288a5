//! Job orchestration.
//!
//! The [`Orchestrator`] accepts jobs, runs each one on its own task and
//! answers status and result queries from the [`JobStore`]. Within a job
//! everything is sequential: outline, then for each slide content, image
//! and optional voiceover, in outline order.
//!
//! ```text
//! queued -> generating_outline -> testing_outline -> (fixing_outline)*
//!        -> slide_1 -> ... -> slide_N -> completed
//! any state -> error
//! ```

mod handle;
mod runner;


pub use handle::JobHandle;

use crate::cancellation::CancellationToken;
use crate::capabilities::Collaborators;
use crate::config::PipelineConfig;
use crate::core::TopicSpec;
use crate::errors::DeckflowError;
use crate::events::{names, EventSink, JobEmitter, NoOpEventSink};
use crate::jobs::{InMemoryJobStore, Job, JobOptions, JobOutcome, JobStatusView, JobStore};
use crate::observability::job_span;
use dashmap::DashMap;
use runner::JobRunner;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, Instrument};
use uuid::Uuid;

/// Entry point for submitting and observing generation jobs.
///
/// Cloning is cheap; clones share the store, sink and running jobs.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    collaborators: Collaborators,
    store: Arc<dyn JobStore>,
    sink: Arc<dyn EventSink>,
    tokens: Arc<DashMap<Uuid, Arc<CancellationToken>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("collaborators", &self.collaborators)
            .field("running", &self.tokens.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with an in-memory job store and no event sink.
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self, DeckflowError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            collaborators,
            store: Arc::new(InMemoryJobStore::new()),
            sink: Arc::new(NoOpEventSink),
            tokens: Arc::new(DashMap::new()),
        })
    }

    /// Replaces the job store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = store;
        self
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the shared configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validates and submits a job, returning a handle to its task.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn submit(&self, topic: TopicSpec, options: JobOptions) -> Result<JobHandle, DeckflowError> {
        topic.validate()?;
        let voice = options.resolve_voice(&self.config)?;
        if voice.is_some() && self.collaborators.speech.is_none() {
            return Err(DeckflowError::InvalidInput(
                "voiceover requested but no speech service is configured".to_string(),
            ));
        }

        let job_id = Uuid::new_v4();
        self.store
            .insert(Job::new(job_id, topic.clone(), options.clone()))?;
        let emitter = JobEmitter::new(self.sink.clone(), job_id);
        emitter
            .emit(
                names::JOB_QUEUED,
                json!({
                    "topic": topic.topic,
                    "slide_count": topic.slide_count,
                    "quality": options.quality.as_str(),
                    "is_agentic": options.is_agentic,
                    "generate_voiceover": options.generate_voiceover,
                }),
            )
            .await;
        info!(
            job_id = %job_id,
            slide_count = topic.slide_count,
            agentic = options.is_agentic,
            "Job queued"
        );

        let token = Arc::new(CancellationToken::new());
        self.tokens.insert(job_id, token.clone());

        let span = job_span(job_id, &topic.topic, topic.slide_count);
        let runner = JobRunner {
            job_id,
            topic,
            options,
            voice,
            config: self.config.clone(),
            collaborators: self.collaborators.clone(),
            store: self.store.clone(),
            emitter,
            token: token.clone(),
            tokens: self.tokens.clone(),
        };
        let join = tokio::spawn(runner.run().instrument(span));
        Ok(JobHandle::new(job_id, token, join))
    }

    /// Submits a job and detaches from it.
    pub async fn start_job(&self, topic: TopicSpec, options: JobOptions) -> Result<Uuid, DeckflowError> {
        self.submit(topic, options).await.map(|handle| handle.job_id())
    }

    /// Returns a polling snapshot of the job.
    pub fn get_status(&self, job_id: Uuid) -> Result<JobStatusView, DeckflowError> {
        self.store.get(job_id).map(|job| job.status_view())
    }

    /// Returns the presentation, the job's error, or that it is still pending.
    pub fn get_result(&self, job_id: Uuid) -> Result<JobOutcome, DeckflowError> {
        self.store.get(job_id).map(|job| job.outcome())
    }

    /// Requests cancellation of a running job.
    ///
    /// Returns false if the job already finished or was already cancelled.
    pub fn cancel(&self, job_id: Uuid, reason: impl Into<String>) -> Result<bool, DeckflowError> {
        let job = self.store.get(job_id)?;
        if job.status.is_terminal() {
            return Ok(false);
        }
        let Some(token) = self.tokens.get(&job_id).map(|entry| entry.value().clone()) else {
            return Ok(false);
        };
        let reason = reason.into();
        let accepted = token.cancel(reason.clone());
        if accepted {
            info!(job_id = %job_id, reason = %reason, "Cancellation requested");
        }
        Ok(accepted)
    }

    /// Returns the number of jobs whose task has not exited.
    #[must_use]
    pub fn running_jobs(&self) -> usize {
        self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobStatus;
    use crate::testing::{wait_for_terminal, ScriptedCollaborators};
    use pretty_assertions::assert_eq;

    fn orchestrator(fixture: &ScriptedCollaborators) -> Orchestrator {
        Orchestrator::new(PipelineConfig::pass_through(), fixture.collaborators()).unwrap()
    }

    #[tokio::test]
    async fn test_submission_rejects_bad_topic() {
        let fixture = ScriptedCollaborators::new();
        let orch = orchestrator(&fixture);

        for topic in [TopicSpec::new("Bees", 1), TopicSpec::new("Bees", 16), TopicSpec::new("  ", 3)] {
            let err = orch.start_job(topic, JobOptions::new()).await.unwrap_err();
            assert_eq!(err.kind(), "InvalidInput");
        }
        assert_eq!(fixture.log.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_voiceover_without_voice_is_rejected() {
        let fixture = ScriptedCollaborators::new();
        let orch = orchestrator(&fixture);
        let err = orch
            .start_job(TopicSpec::new("Bees", 2), JobOptions::new().with_voiceover(None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[tokio::test]
    async fn test_voiceover_without_speech_service_is_rejected() {
        let fixture = ScriptedCollaborators::new();
        let collaborators = fixture.collaborators();
        let collaborators = Collaborators::new(
            collaborators.outline,
            collaborators.content,
            collaborators.image,
        );
        let orch = Orchestrator::new(
            PipelineConfig::pass_through().with_default_voice("narrator"),
            collaborators,
        )
        .unwrap();
        let err = orch
            .start_job(TopicSpec::new("Bees", 2), JobOptions::new().with_voiceover(None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("speech service"));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let fixture = ScriptedCollaborators::new();
        let orch = orchestrator(&fixture);
        let id = Uuid::new_v4();
        assert_eq!(orch.get_status(id).unwrap_err().kind(), "JobNotFound");
        assert_eq!(orch.get_result(id).unwrap_err().kind(), "JobNotFound");
        assert_eq!(orch.cancel(id, "x").unwrap_err().kind(), "JobNotFound");
    }

    #[tokio::test]
    async fn test_start_job_runs_to_completion() {
        let fixture = ScriptedCollaborators::new();
        let orch = orchestrator(&fixture);
        let id = orch
            .start_job(TopicSpec::new("Bees", 2), JobOptions::new())
            .await
            .unwrap();

        let view = wait_for_terminal(&orch, id).await;
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.progress.completion_percent, 100);
        assert!(matches!(orch.get_result(id).unwrap(), JobOutcome::Completed(_)));
        assert!(!orch.cancel(id, "too late").unwrap());
    }

    #[tokio::test]
    async fn test_handle_wait_releases_token() {
        let fixture = ScriptedCollaborators::new();
        let orch = orchestrator(&fixture);
        let handle = orch
            .submit(TopicSpec::new("Bees", 3), JobOptions::new())
            .await
            .unwrap();
        let id = handle.job_id();

        let view = handle.wait().await.unwrap();
        assert_eq!(view.job_id, id);
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(orch.running_jobs(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let fixture = ScriptedCollaborators::new();
        let config = PipelineConfig::pass_through()
            .with_image_policy(crate::config::StagePolicy::new(0, 0));
        assert!(Orchestrator::new(config, fixture.collaborators()).is_err());
    }
}
