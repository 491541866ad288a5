//! Job status, stage kind and quality tier enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of artifact a stage produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Whole-presentation outline.
    Outline,
    /// Per-slide text content.
    Content,
    /// Per-slide image.
    Image,
    /// Per-slide speech synthesis.
    Voiceover,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outline => write!(f, "outline"),
            Self::Content => write!(f, "content"),
            Self::Image => write!(f, "image"),
            Self::Voiceover => write!(f, "voiceover"),
        }
    }
}

/// The lifecycle status of a job.
///
/// Serialized as its wire string (`"generating_outline"`, `"slide_3"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum JobStatus {
    /// Submitted, not yet started.
    #[default]
    Queued,
    /// Generating the initial outline.
    GeneratingOutline,
    /// Validating the outline.
    TestingOutline,
    /// Running an outline fix round.
    FixingOutline,
    /// Processing the given 1-based slide.
    Slide(usize),
    /// All stages succeeded and the presentation is assembled.
    Completed,
    /// A stage failed or the job was cancelled.
    Error,
}

impl JobStatus {
    /// Returns true if the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Returns true if the job is past submission and not yet terminal.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.is_terminal() && *self != Self::Queued
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::GeneratingOutline => write!(f, "generating_outline"),
            Self::TestingOutline => write!(f, "testing_outline"),
            Self::FixingOutline => write!(f, "fixing_outline"),
            Self::Slide(n) => write!(f, "slide_{n}"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "generating_outline" => Ok(Self::GeneratingOutline),
            "testing_outline" => Ok(Self::TestingOutline),
            "fixing_outline" => Ok(Self::FixingOutline),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => other
                .strip_prefix("slide_")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n >= 1)
                .map(Self::Slide)
                .ok_or_else(|| format!("unknown job status '{other}'")),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for JobStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// Image quality tier selected per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Cheapest model.
    Low,
    /// Balanced model.
    #[default]
    Medium,
    /// Highest quality model.
    High,
}

impl QualityTier {
    /// Parses a tier name leniently. Unknown names fall back to `Medium`.
    #[must_use]
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }

    /// Returns the config key for this tier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Queued.to_string(), "queued");
        assert_eq!(JobStatus::FixingOutline.to_string(), "fixing_outline");
        assert_eq!(JobStatus::Slide(3).to_string(), "slide_3");
        assert_eq!(JobStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn test_job_status_parse() {
        assert_eq!("slide_12".parse::<JobStatus>(), Ok(JobStatus::Slide(12)));
        assert_eq!("testing_outline".parse::<JobStatus>(), Ok(JobStatus::TestingOutline));
        assert!("slide_0".parse::<JobStatus>().is_err());
        assert!("slide_x".parse::<JobStatus>().is_err());
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_job_status_serialize() {
        let json = serde_json::to_string(&JobStatus::Slide(2)).unwrap();
        assert_eq!(json, r#""slide_2""#);

        let status: JobStatus = serde_json::from_str(r#""generating_outline""#).unwrap();
        assert_eq!(status, JobStatus::GeneratingOutline);
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Slide(1).is_terminal());
        assert!(JobStatus::Slide(1).is_running());
        assert!(!JobStatus::Queued.is_running());
    }

    #[test]
    fn test_quality_tier_lenient() {
        assert_eq!(QualityTier::parse_lenient("HIGH"), QualityTier::High);
        assert_eq!(QualityTier::parse_lenient(" low "), QualityTier::Low);
        assert_eq!(QualityTier::parse_lenient("ultra"), QualityTier::Medium);
    }

    #[test]
    fn test_stage_kind_serialize() {
        let json = serde_json::to_string(&StageKind::Voiceover).unwrap();
        assert_eq!(json, r#""voiceover""#);
        assert_eq!(StageKind::Image.to_string(), "image");
    }
}
