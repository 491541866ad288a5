//! # Deckflow
//!
//! Orchestration core for multi-slide presentation generation.
//!
//! A job turns a topic and slide count into an outline, then walks the
//! slides in order producing text content, an image and optionally a
//! narration track for each. Outline, content and image stages run a
//! generate-validate-fix loop against external generative collaborators:
//!
//! - **Fix loop**: bounded refinement with last-wins or best-wins retention
//! - **Stages**: outline, content, best-of-N image search and voiceover
//! - **Usage accounting**: exact token totals per job
//! - **Job orchestration**: background jobs with progress, results and cancellation
//! - **Observability**: `tracing` spans plus a pluggable job event sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deckflow::prelude::*;
//!
//! let collaborators = Collaborators::new(outline, content, image)
//!     .with_speech(speech)
//!     .with_store(store);
//! let orchestrator = Orchestrator::new(PipelineConfig::strict(), collaborators)?;
//!
//! let handle = orchestrator
//!     .submit(TopicSpec::new("Ocean tides", 5), JobOptions::new().with_agentic(true))
//!     .await?;
//! let view = handle.wait().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod capabilities;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod jobs;
pub mod observability;
pub mod orchestrator;
pub mod refine;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::capabilities::{
        Collaborators, ContentService, DeckExporter, ImageService, JobRecord,
        JsonFileExporter, OutlineService, PresentationStore, SpeechRequest, SpeechService,
    };
    pub use crate::config::{
        ImageModels, PipelineConfig, StagePolicy, VoiceConfig, VoiceSettings,
        VoiceoverFailurePolicy,
    };
    pub use crate::core::{
        JobStatus, Metered, Outline, Presentation, QualityTier, SlideContent, SlideOutline,
        SlideRecord, StageKind, TopicSpec, UsageCounters, UsageDelta, ValidationResult,
    };
    pub use crate::errors::DeckflowError;
    pub use crate::events::{
        CollectingEventSink, EventSink, JobEvent, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::jobs::{InMemoryJobStore, JobOptions, JobOutcome, JobStatusView, JobStore};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::orchestrator::{JobHandle, Orchestrator};
    pub use crate::refine::{FixLoop, LoopConfig, Refiner, RetentionPolicy};
}
