//! Pipeline configuration shared read-only by every job.

use crate::core::QualityTier;
use crate::errors::DeckflowError;
use serde::{Deserialize, Serialize};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "DECKFLOW_";

/// Acceptance threshold and attempt bound for one stage.
///
/// For the outline and content stages `max_attempts` bounds the number of
/// fix rounds after the first validation. For the image stage it bounds the
/// total number of generated images, the first one included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePolicy {
    /// Minimum accepted score.
    pub threshold: i64,
    /// Attempt bound, see the type docs.
    pub max_attempts: usize,
}

impl StagePolicy {
    /// Creates a new stage policy.
    #[must_use]
    pub const fn new(threshold: i64, max_attempts: usize) -> Self {
        Self {
            threshold,
            max_attempts,
        }
    }
}

/// What a failed voiceover synthesis does to the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceoverFailurePolicy {
    /// The job transitions to `error`.
    #[default]
    FailJob,
    /// The slide is kept without audio.
    SkipSlide,
}

impl std::str::FromStr for VoiceoverFailurePolicy {
    type Err = DeckflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_job" | "failjob" => Ok(Self::FailJob),
            "skip_slide" | "skipslide" => Ok(Self::SkipSlide),
            other => Err(DeckflowError::InvalidInput(format!(
                "unknown voiceover failure policy '{other}'"
            ))),
        }
    }
}

/// Voice synthesis settings passed to the speech collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Voice stability.
    #[serde(default = "default_stability")]
    pub stability: f64,
    /// Similarity boost.
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f64,
    /// Speaking speed multiplier.
    #[serde(default = "default_speed")]
    pub speed: f64,
}

fn default_stability() -> f64 {
    0.5
}

fn default_similarity_boost() -> f64 {
    0.75
}

fn default_speed() -> f64 {
    1.05
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            speed: default_speed(),
        }
    }
}

/// A resolved voice: which voice to use and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Voice identifier understood by the speech collaborator.
    pub voice_id: String,
    /// Synthesis settings.
    pub settings: VoiceSettings,
}

/// Image model identifiers per quality tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageModels {
    /// Model for [`QualityTier::Low`].
    #[serde(default = "default_low_model")]
    pub low: String,
    /// Model for [`QualityTier::Medium`].
    #[serde(default = "default_medium_model")]
    pub medium: String,
    /// Model for [`QualityTier::High`].
    #[serde(default = "default_high_model")]
    pub high: String,
}

fn default_low_model() -> String {
    "fal-ai/flux/dev".to_string()
}

fn default_medium_model() -> String {
    "fal-ai/recraft-20b".to_string()
}

fn default_high_model() -> String {
    "fal-ai/imagen3".to_string()
}

impl Default for ImageModels {
    fn default() -> Self {
        Self {
            low: default_low_model(),
            medium: default_medium_model(),
            high: default_high_model(),
        }
    }
}

impl ImageModels {
    /// Returns the model id for a tier.
    #[must_use]
    pub fn model_for(&self, tier: QualityTier) -> &str {
        match tier {
            QualityTier::Low => &self.low,
            QualityTier::Medium => &self.medium,
            QualityTier::High => &self.high,
        }
    }
}

/// Configuration for the orchestration core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Outline stage policy.
    pub outline: StagePolicy,
    /// Content stage policy.
    pub content: StagePolicy,
    /// Image stage policy.
    pub image: StagePolicy,
    /// Image model per quality tier.
    #[serde(default)]
    pub image_models: ImageModels,
    /// Voice settings applied to every synthesis call.
    #[serde(default)]
    pub voice_settings: VoiceSettings,
    /// Voice used when a job asks for voiceover without naming one.
    #[serde(default)]
    pub default_voice_id: Option<String>,
    /// What a failed synthesis does to the job.
    #[serde(default)]
    pub voiceover_failure_policy: VoiceoverFailurePolicy,
    /// Whether completed presentations are handed to the deck exporter.
    #[serde(default = "default_export_on_completion")]
    pub export_on_completion: bool,
}

fn default_export_on_completion() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::pass_through()
    }
}

impl PipelineConfig {
    /// All thresholds at zero: every validation passes and no fix round runs.
    #[must_use]
    pub fn pass_through() -> Self {
        Self::with_thresholds(0, 0, 0)
    }

    /// The strict thresholds used for interactive generation.
    #[must_use]
    pub fn strict() -> Self {
        Self::with_thresholds(80, 14, 10)
    }

    /// Builds a config with the given thresholds and default attempt bounds.
    #[must_use]
    pub fn with_thresholds(outline: i64, content: i64, image: i64) -> Self {
        Self {
            outline: StagePolicy::new(outline, 1),
            content: StagePolicy::new(content, 1),
            image: StagePolicy::new(image, 5),
            image_models: ImageModels::default(),
            voice_settings: VoiceSettings::default(),
            default_voice_id: None,
            voiceover_failure_policy: VoiceoverFailurePolicy::default(),
            export_on_completion: default_export_on_completion(),
        }
    }

    /// Sets the outline policy.
    #[must_use]
    pub fn with_outline_policy(mut self, policy: StagePolicy) -> Self {
        self.outline = policy;
        self
    }

    /// Sets the content policy.
    #[must_use]
    pub fn with_content_policy(mut self, policy: StagePolicy) -> Self {
        self.content = policy;
        self
    }

    /// Sets the image policy.
    #[must_use]
    pub fn with_image_policy(mut self, policy: StagePolicy) -> Self {
        self.image = policy;
        self
    }

    /// Sets the default voice.
    #[must_use]
    pub fn with_default_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.default_voice_id = Some(voice_id.into());
        self
    }

    /// Sets the voiceover failure policy.
    #[must_use]
    pub fn with_voiceover_failure_policy(mut self, policy: VoiceoverFailurePolicy) -> Self {
        self.voiceover_failure_policy = policy;
        self
    }

    /// Enables or disables export on completion.
    #[must_use]
    pub fn with_export_on_completion(mut self, enabled: bool) -> Self {
        self.export_on_completion = enabled;
        self
    }

    /// Checks the attempt bounds.
    pub fn validate(&self) -> Result<(), DeckflowError> {
        if self.image.max_attempts < 1 {
            return Err(DeckflowError::InvalidInput(
                "image.max_attempts must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads the pass-through defaults overridden by `DECKFLOW_*` variables.
    pub fn from_env() -> Result<Self, DeckflowError> {
        Self::pass_through().apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a key lookup.
    ///
    /// Recognised keys (without prefix): `OUTLINE_THRESHOLD`,
    /// `CONTENT_THRESHOLD`, `IMAGE_THRESHOLD`, `IMAGE_MAX_ATTEMPTS`,
    /// `DEFAULT_VOICE_ID`, `VOICEOVER_FAILURE_POLICY`, `EXPORT_ON_COMPLETION`.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, DeckflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("OUTLINE_THRESHOLD") {
            self.outline.threshold = parse_var("OUTLINE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("CONTENT_THRESHOLD") {
            self.content.threshold = parse_var("CONTENT_THRESHOLD", &v)?;
        }
        if let Some(v) = get("IMAGE_THRESHOLD") {
            self.image.threshold = parse_var("IMAGE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("IMAGE_MAX_ATTEMPTS") {
            self.image.max_attempts = parse_var("IMAGE_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("DEFAULT_VOICE_ID") {
            self.default_voice_id = Some(v);
        }
        if let Some(v) = get("VOICEOVER_FAILURE_POLICY") {
            self.voiceover_failure_policy = v.parse()?;
        }
        if let Some(v) = get("EXPORT_ON_COMPLETION") {
            self.export_on_completion = parse_var("EXPORT_ON_COMPLETION", &v)?;
        }

        self.validate()?;
        Ok(self)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, DeckflowError> {
    value.trim().parse().map_err(|_| {
        DeckflowError::InvalidInput(format!("{ENV_PREFIX}{name} has invalid value '{value}'"))
    })
}
