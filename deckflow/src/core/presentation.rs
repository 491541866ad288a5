//! The assembled presentation aggregate and its builder.

use super::model::{AudioHandle, ImageHandle, SlideContent, SlideOutline, TopicSpec};
use super::usage::UsageCounters;
use crate::errors::DeckflowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Final per-slide unit handed to persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideRecord {
    /// 1-based slide number.
    pub slide_number: usize,
    /// Slide title from the outline.
    pub title: String,
    /// Slide focus from the outline.
    pub focus: String,
    /// Lines displayed on the slide.
    pub onscreen_text: Vec<String>,
    /// Narration text.
    pub voiceover_text: String,
    /// Prompt that produced the selected image.
    pub image_prompt: String,
    /// Location of the selected image.
    pub image_location: String,
    /// Location of the synthesized narration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voiceover_location: Option<String>,
}

/// Immutable presentation aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation {
    id: Uuid,
    title: String,
    topic: String,
    slide_count: usize,
    created_at: DateTime<Utc>,
    usage: UsageCounters,
    generation_time_ms: u64,
    slides: Vec<SlideRecord>,
}

impl Presentation {
    /// Returns the presentation id (equal to the job id).
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the presentation title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the topic the presentation was generated for.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the number of slides.
    #[must_use]
    pub fn slide_count(&self) -> usize {
        self.slide_count
    }

    /// Returns when the presentation was assembled.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the job's final usage totals.
    #[must_use]
    pub fn usage(&self) -> UsageCounters {
        self.usage
    }

    /// Returns the wall-clock generation time in milliseconds.
    #[must_use]
    pub fn generation_time_ms(&self) -> u64 {
        self.generation_time_ms
    }

    /// Returns the ordered slide records.
    #[must_use]
    pub fn slides(&self) -> &[SlideRecord] {
        &self.slides
    }

    /// Converts to a JSON value.
    pub fn to_json(&self) -> Result<serde_json::Value, DeckflowError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Folds validated per-slide stage outputs into a [`Presentation`].
#[derive(Debug, Clone)]
pub struct PresentationBuilder {
    id: Uuid,
    title: String,
    topic: TopicSpec,
    slides: Vec<SlideRecord>,
}

impl PresentationBuilder {
    /// Starts a presentation for the given job and outline title.
    #[must_use]
    pub fn new(id: Uuid, topic: TopicSpec, title: impl Into<String>) -> Self {
        let capacity = topic.slide_count;
        Self {
            id,
            title: title.into(),
            topic,
            slides: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of slides folded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    /// Returns true if no slides have been folded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Folds the next slide. Slides must arrive in outline order.
    pub fn push_slide(
        &mut self,
        outline: &SlideOutline,
        content: SlideContent,
        image: &ImageHandle,
        voiceover: Option<&AudioHandle>,
    ) -> Result<(), DeckflowError> {
        let expected = self.slides.len() + 1;
        if outline.slide_number != expected {
            return Err(DeckflowError::Internal(format!(
                "slide {} folded out of order, expected slide {expected}",
                outline.slide_number
            )));
        }
        self.slides.push(SlideRecord {
            slide_number: outline.slide_number,
            title: outline.title.clone(),
            focus: outline.focus.clone(),
            onscreen_text: content.onscreen_text,
            voiceover_text: content.voiceover_text,
            image_prompt: content.image_prompt,
            image_location: image.location().to_string(),
            voiceover_location: voiceover.map(|audio| audio.location().to_string()),
        });
        Ok(())
    }

    /// Attaches final usage and yields the immutable presentation.
    ///
    /// Fails if fewer or more slides were folded than the topic requested.
    pub fn build(
        self,
        usage: UsageCounters,
        generation_time_ms: u64,
    ) -> Result<Presentation, DeckflowError> {
        if self.slides.len() != self.topic.slide_count {
            return Err(DeckflowError::Internal(format!(
                "presentation has {} slides, expected {}",
                self.slides.len(),
                self.topic.slide_count
            )));
        }
        Ok(Presentation {
            id: self.id,
            title: self.title,
            topic: self.topic.topic,
            slide_count: self.topic.slide_count,
            created_at: Utc::now(),
            usage,
            generation_time_ms,
            slides: self.slides,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn content(n: usize) -> SlideContent {
        SlideContent::new(vec![format!("line {n}")], format!("voice {n}"), format!("prompt {n}"))
    }

    #[test]
    fn test_builder_folds_in_order() {
        let id = Uuid::new_v4();
        let mut builder = PresentationBuilder::new(id, TopicSpec::new("Tides", 2), "Ocean Tides");

        builder
            .push_slide(
                &SlideOutline::new("Intro", "what tides are", 1),
                content(1),
                &ImageHandle::new("img/1.png"),
                Some(&AudioHandle::new("audio/slide_1.mp3")),
            )
            .unwrap();
        builder
            .push_slide(
                &SlideOutline::new("Moon", "gravity", 2),
                content(2),
                &ImageHandle::new("img/2.png"),
                None,
            )
            .unwrap();

        let usage = UsageCounters {
            input_tokens: 10,
            output_tokens: 5,
        };
        let presentation = builder.build(usage, 1200).unwrap();

        assert_eq!(presentation.id(), id);
        assert_eq!(presentation.title(), "Ocean Tides");
        assert_eq!(presentation.slide_count(), 2);
        assert_eq!(presentation.usage(), usage);
        assert_eq!(presentation.slides()[0].voiceover_location.as_deref(), Some("audio/slide_1.mp3"));
        assert_eq!(presentation.slides()[1].image_location, "img/2.png");
        assert_eq!(presentation.slides()[1].voiceover_location, None);
    }

    #[test]
    fn test_builder_rejects_out_of_order() {
        let mut builder =
            PresentationBuilder::new(Uuid::new_v4(), TopicSpec::new("Tides", 2), "Ocean Tides");
        let err = builder
            .push_slide(
                &SlideOutline::new("Moon", "gravity", 2),
                content(2),
                &ImageHandle::new("img/2.png"),
                None,
            )
            .unwrap_err();
        assert!(err.to_string().contains("out of order"));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_build_requires_all_slides() {
        let builder =
            PresentationBuilder::new(Uuid::new_v4(), TopicSpec::new("Tides", 3), "Ocean Tides");
        assert!(builder.build(UsageCounters::default(), 0).is_err());
    }

    #[test]
    fn test_presentation_serializes_slides() {
        let mut builder =
            PresentationBuilder::new(Uuid::new_v4(), TopicSpec::new("Tides", 2), "Ocean Tides");
        for n in 1..=2 {
            builder
                .push_slide(
                    &SlideOutline::new(format!("S{n}"), "f", n),
                    content(n),
                    &ImageHandle::new(format!("img/{n}.png")),
                    None,
                )
                .unwrap();
        }
        let json = builder.build(UsageCounters::default(), 0).unwrap().to_json().unwrap();
        assert_eq!(json["slides"].as_array().unwrap().len(), 2);
        assert!(json["slides"][0].get("voiceover_location").is_none());
    }
}
