//! Core domain model types for deckflow.
//!
//! This module contains the values that flow through a job:
//! - Job status, stage kind and quality tier enums
//! - Outline, slide content and validation results
//! - Token usage accounting
//! - The presentation aggregate and its builder

mod model;
mod presentation;
mod status;
mod usage;

pub use model::{
    AudioHandle, ImageHandle, Outline, SlideContent, SlideOutline, TopicSpec, ValidationResult,
    MAX_SLIDE_COUNT, MIN_SLIDE_COUNT,
};
pub use presentation::{Presentation, PresentationBuilder, SlideRecord};
pub use status::{JobStatus, QualityTier, StageKind};
pub use usage::{Metered, UsageAccountant, UsageCounters, UsageDelta};
