//! Collaborator ports consumed by the orchestration core.
//!
//! Each port is an object-safe async trait. Concrete model invocations,
//! storage and file assembly live outside this crate; the orchestrator only
//! sees these seams, bundled into [`Collaborators`].

mod export;

pub use export::JsonFileExporter;

use crate::config::VoiceConfig;
use crate::core::{
    AudioHandle, ImageHandle, JobStatus, Metered, Outline, Presentation, SlideContent,
    SlideOutline, SlideRecord, TopicSpec, UsageCounters, ValidationResult,
};
use crate::errors::DeckflowError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Outline generation, validation and repair.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutlineService: Send + Sync {
    /// Generates an outline for the topic.
    async fn generate_outline(&self, topic: &TopicSpec) -> Result<Metered<Outline>, DeckflowError>;

    /// Scores an outline against the topic and slide count.
    async fn validate_outline(
        &self,
        topic: &TopicSpec,
        outline: &Outline,
    ) -> Result<Metered<ValidationResult>, DeckflowError>;

    /// Returns a full replacement outline addressing the feedback.
    async fn fix_outline(
        &self,
        outline: &Outline,
        feedback: &ValidationResult,
    ) -> Result<Metered<Outline>, DeckflowError>;
}

/// Per-slide content generation, validation and repair.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Generates content for one slide.
    async fn generate_content(
        &self,
        title: &str,
        slide: &SlideOutline,
    ) -> Result<Metered<SlideContent>, DeckflowError>;

    /// Scores slide content.
    async fn validate_content(
        &self,
        title: &str,
        slide: &SlideOutline,
        content: &SlideContent,
    ) -> Result<Metered<ValidationResult>, DeckflowError>;

    /// Returns full replacement content addressing the feedback.
    async fn fix_content(
        &self,
        title: &str,
        slide: &SlideOutline,
        content: &SlideContent,
        feedback: &ValidationResult,
    ) -> Result<Metered<SlideContent>, DeckflowError>;
}

/// Image generation, validation and prompt repair.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Materializes an image for the prompt with the given model.
    async fn generate_image(&self, prompt: &str, model: &str) -> Result<ImageHandle, DeckflowError>;

    /// Scores an image against the slide it illustrates.
    async fn validate_image(
        &self,
        image: &ImageHandle,
        content: &SlideContent,
    ) -> Result<Metered<ValidationResult>, DeckflowError>;

    /// Returns the content with an improved image prompt.
    async fn fix_image_prompt(
        &self,
        content: &SlideContent,
        feedback: &ValidationResult,
    ) -> Result<Metered<SlideContent>, DeckflowError>;
}

/// One narration request.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    /// Job the narration belongs to.
    pub job_id: Uuid,
    /// 1-based slide number.
    pub slide_number: usize,
    /// Text to speak.
    pub text: String,
    /// Voice to speak it with.
    pub voice: VoiceConfig,
}

/// Speech synthesis.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Synthesizes narration and returns where the audio lives.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioHandle, DeckflowError>;
}

/// Job history row handed to the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job id.
    pub job_id: Uuid,
    /// Topic.
    pub topic: String,
    /// Requested slide count.
    pub slide_count: usize,
    /// Submitting client, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Final status.
    pub status: JobStatus,
    /// Final usage totals.
    pub usage: UsageCounters,
    /// Wall-clock generation time.
    pub generation_time_ms: u64,
    /// Submission time.
    pub created_at: DateTime<Utc>,
}

/// Storage collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresentationStore: Send + Sync {
    /// Persists the job history row.
    async fn persist_job(&self, record: &JobRecord) -> Result<(), DeckflowError>;

    /// Persists the slides of a completed job.
    async fn persist_slides(&self, job_id: Uuid, slides: &[SlideRecord]) -> Result<(), DeckflowError>;
}

/// Downstream deck file assembly.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeckExporter: Send + Sync {
    /// Writes the presentation out and returns the file path.
    async fn export_deck(&self, presentation: &Presentation) -> Result<PathBuf, DeckflowError>;
}

/// The set of collaborators a job runs against.
#[derive(Clone)]
pub struct Collaborators {
    /// Outline port.
    pub outline: Arc<dyn OutlineService>,
    /// Content port.
    pub content: Arc<dyn ContentService>,
    /// Image port.
    pub image: Arc<dyn ImageService>,
    /// Speech port, required only for voiceover jobs.
    pub speech: Option<Arc<dyn SpeechService>>,
    /// Storage port.
    pub store: Option<Arc<dyn PresentationStore>>,
    /// Export port.
    pub exporter: Option<Arc<dyn DeckExporter>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("has_speech", &self.speech.is_some())
            .field("has_store", &self.store.is_some())
            .field("has_exporter", &self.exporter.is_some())
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Creates a collaborator set with the three generative ports.
    #[must_use]
    pub fn new(
        outline: Arc<dyn OutlineService>,
        content: Arc<dyn ContentService>,
        image: Arc<dyn ImageService>,
    ) -> Self {
        Self {
            outline,
            content,
            image,
            speech: None,
            store: None,
            exporter: None,
        }
    }

    /// Sets the speech port.
    #[must_use]
    pub fn with_speech(mut self, speech: Arc<dyn SpeechService>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Sets the storage port.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn PresentationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the export port.
    #[must_use]
    pub fn with_exporter(mut self, exporter: Arc<dyn DeckExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }
}
