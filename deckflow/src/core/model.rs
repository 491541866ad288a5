//! Presentation domain values exchanged with the generative collaborators.

use crate::errors::DeckflowError;
use serde::{Deserialize, Serialize};

/// Smallest slide count a job may request.
pub const MIN_SLIDE_COUNT: usize = 2;

/// Largest slide count a job may request.
pub const MAX_SLIDE_COUNT: usize = 15;

/// Immutable job input: what the presentation is about and how long it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSpec {
    /// Presentation topic.
    pub topic: String,
    /// Number of slides to generate.
    pub slide_count: usize,
}

impl TopicSpec {
    /// Creates a new topic spec.
    #[must_use]
    pub fn new(topic: impl Into<String>, slide_count: usize) -> Self {
        Self {
            topic: topic.into(),
            slide_count,
        }
    }

    /// Checks the topic is non-empty and the slide count is in range.
    pub fn validate(&self) -> Result<(), DeckflowError> {
        if self.topic.trim().is_empty() {
            return Err(DeckflowError::InvalidInput("topic must not be empty".to_string()));
        }
        if !(MIN_SLIDE_COUNT..=MAX_SLIDE_COUNT).contains(&self.slide_count) {
            return Err(DeckflowError::InvalidInput(format!(
                "slide_count must be between {MIN_SLIDE_COUNT} and {MAX_SLIDE_COUNT}, got {}",
                self.slide_count
            )));
        }
        Ok(())
    }
}

/// One entry of an outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideOutline {
    /// Slide title.
    pub title: String,
    /// Core message the slide conveys.
    pub focus: String,
    /// 1-based position in the outline.
    pub slide_number: usize,
}

impl SlideOutline {
    /// Creates a new slide outline entry.
    #[must_use]
    pub fn new(title: impl Into<String>, focus: impl Into<String>, slide_number: usize) -> Self {
        Self {
            title: title.into(),
            focus: focus.into(),
            slide_number,
        }
    }
}

/// Whole-presentation outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    /// Presentation title.
    pub title: String,
    /// Ordered slide entries.
    pub slides: Vec<SlideOutline>,
}

impl Outline {
    /// Creates a new outline.
    #[must_use]
    pub fn new(title: impl Into<String>, slides: Vec<SlideOutline>) -> Self {
        Self {
            title: title.into(),
            slides,
        }
    }

    /// Returns the number of slides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Returns true if the outline has no slides.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Enforces the outline invariant: exactly `expected` slides numbered
    /// `1..=expected` in order.
    ///
    /// A count mismatch is a malformed collaborator response. Numbering is
    /// repaired in place since position is authoritative.
    pub fn normalize(mut self, expected: usize) -> Result<Self, DeckflowError> {
        if self.slides.len() != expected {
            return Err(DeckflowError::validation(
                "outline",
                format!("expected {expected} slides, got {}", self.slides.len()),
            ));
        }
        for (index, slide) in self.slides.iter_mut().enumerate() {
            slide.slide_number = index + 1;
        }
        Ok(self)
    }
}

/// Generated text content for one slide.
///
/// Replaced wholesale by fixers, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlideContent {
    /// Lines displayed on the slide.
    pub onscreen_text: Vec<String>,
    /// Narration for the slide.
    pub voiceover_text: String,
    /// Image prompt, always in English.
    pub image_prompt: String,
}

impl SlideContent {
    /// Creates new slide content.
    #[must_use]
    pub fn new(
        onscreen_text: Vec<String>,
        voiceover_text: impl Into<String>,
        image_prompt: impl Into<String>,
    ) -> Self {
        Self {
            onscreen_text,
            voiceover_text: voiceover_text.into(),
            image_prompt: image_prompt.into(),
        }
    }

    /// Returns a copy with a different image prompt.
    #[must_use]
    pub fn with_image_prompt(&self, prompt: impl Into<String>) -> Self {
        Self {
            image_prompt: prompt.into(),
            ..self.clone()
        }
    }
}

/// Score and feedback for one artifact version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Score assigned by the validator.
    pub score: i64,
    /// Free-form feedback.
    pub feedback: String,
    /// Optional improvement suggestions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<String>,
}

impl ValidationResult {
    /// Creates a validation result without suggestions.
    #[must_use]
    pub fn new(score: i64, feedback: impl Into<String>) -> Self {
        Self {
            score,
            feedback: feedback.into(),
            suggestions: None,
        }
    }

    /// Sets the suggestions.
    #[must_use]
    pub fn with_suggestions(mut self, suggestions: impl Into<String>) -> Self {
        self.suggestions = Some(suggestions.into());
        self
    }

    /// Returns true if the score meets the threshold.
    #[must_use]
    pub fn meets(&self, threshold: i64) -> bool {
        self.score >= threshold
    }
}

/// Handle to an image materialized by the image collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHandle(pub String);

impl ImageHandle {
    /// Creates a new image handle.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Returns the image location.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.0
    }
}

/// Handle to synthesized audio.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioHandle(pub String);

impl AudioHandle {
    /// Creates a new audio handle.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Returns the audio location.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.0
    }
}
