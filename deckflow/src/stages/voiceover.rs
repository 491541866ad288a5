//! Per-slide voiceover stage.

use crate::capabilities::{SpeechRequest, SpeechService};
use crate::config::VoiceoverFailurePolicy;
use crate::core::AudioHandle;
use crate::errors::DeckflowError;
use tracing::warn;

/// What the voiceover stage produced for one slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceoverOutcome {
    /// Narration was synthesized.
    Synthesized(AudioHandle),
    /// Synthesis failed and the slide keeps no audio.
    Skipped {
        /// Why the slide has no audio.
        reason: String,
    },
}

impl VoiceoverOutcome {
    /// Returns the audio handle if synthesis succeeded.
    #[must_use]
    pub fn audio(&self) -> Option<&AudioHandle> {
        match self {
            Self::Synthesized(audio) => Some(audio),
            Self::Skipped { .. } => None,
        }
    }
}

/// Single-shot speech synthesis for one slide.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoiceoverStage {
    failure_policy: VoiceoverFailurePolicy,
}

impl VoiceoverStage {
    /// Creates the stage with the given failure policy.
    #[must_use]
    pub const fn new(failure_policy: VoiceoverFailurePolicy) -> Self {
        Self { failure_policy }
    }

    /// Synthesizes narration. Under `SkipSlide` a failure yields `Skipped`
    /// instead of an error.
    pub async fn run(
        &self,
        service: &dyn SpeechService,
        request: &SpeechRequest,
    ) -> Result<VoiceoverOutcome, DeckflowError> {
        match service.synthesize(request).await {
            Ok(audio) => Ok(VoiceoverOutcome::Synthesized(audio)),
            Err(err @ DeckflowError::Cancelled(_)) => Err(err),
            Err(err) => match self.failure_policy {
                VoiceoverFailurePolicy::FailJob => Err(err),
                VoiceoverFailurePolicy::SkipSlide => {
                    warn!(
                        slide = request.slide_number,
                        error = %err,
                        "Voiceover failed, keeping slide without audio"
                    );
                    Ok(VoiceoverOutcome::Skipped {
                        reason: err.to_string(),
                    })
                }
            },
        }
    }
}
