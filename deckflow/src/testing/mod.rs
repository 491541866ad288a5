//! Testing utilities for deckflow jobs.
//!
//! This module provides:
//! - Scripted collaborators with call logs, score scripts and failure injection
//! - A fixture wiring them into an orchestrator
//! - Assertions for job snapshots and event streams

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_job_completed, assert_job_failed, assert_outline_numbered,
    assert_presentation_numbered, assert_progress_monotonic, status_percents,
};
pub use fixtures::{wait_for_terminal, ScriptedCollaborators};
pub use mocks::{
    Call, CallLog, Hold, RecordingExporter, RecordingStore, ScoreScript, ScriptedContentService,
    ScriptedImageService, ScriptedOutlineService, ScriptedSpeechService,
};
