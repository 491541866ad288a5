//! Generation stages.
//!
//! Each stage wraps one collaborator port in the loop policy it needs:
//!
//! - [`OutlineStage`] and [`ContentStage`] keep the last fix (`LastWins`).
//! - [`ImageStage`] searches up to N images and adopts the best (`BestWins`).
//! - [`VoiceoverStage`] is single-shot with a configurable failure policy.
//!
//! Stages never touch job state; the runner sequences them and reports.

mod content;
mod image;
mod outline;
mod voiceover;

pub use content::ContentStage;
pub use image::{ImageAttempt, ImageCandidate, ImageOutcome, ImageStage};
pub use outline::OutlineStage;
pub use voiceover::{VoiceoverOutcome, VoiceoverStage};
