//! Error types for the deckflow orchestration core.
//!
//! Collaborator failures are classified into a small taxonomy so the
//! orchestrator can tell a failed job apart from a degraded one. Exhausting
//! a fix loop is not an error: it is reported on the loop outcome instead.

use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// The main error type for deckflow operations.
#[derive(Debug, Clone, Error)]
pub enum DeckflowError {
    /// A collaborator was unreachable or timed out.
    #[error("Transport error in {service}: {message}")]
    Transport {
        /// The collaborator that failed.
        service: String,
        /// The underlying message.
        message: String,
    },

    /// A collaborator returned a malformed or inconsistent response.
    #[error("Validation error in {service}: {message}")]
    Validation {
        /// The collaborator that produced the response.
        service: String,
        /// What was wrong with it.
        message: String,
    },

    /// Speech synthesis failed.
    #[error("Synthesis error for slide {slide_number}: {message}")]
    Synthesis {
        /// The slide whose voiceover failed.
        slide_number: usize,
        /// The underlying message.
        message: String,
    },

    /// Persistence or export failed.
    #[error("File error: {0}")]
    File(String),

    /// No job exists with the given id.
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// The caller is not allowed to perform the operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The submitted topic or options are invalid.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The job was cancelled between stages.
    #[error("Job cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeckflowError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a validation (malformed response) error.
    #[must_use]
    pub fn validation(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a synthesis error.
    #[must_use]
    pub fn synthesis(slide_number: usize, message: impl Into<String>) -> Self {
        Self::Synthesis {
            slide_number,
            message: message.into(),
        }
    }

    /// Wraps any foreign error raised while talking to a collaborator.
    #[must_use]
    pub fn from_anyhow(service: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::transport(service, format!("{err:#}"))
    }

    /// Returns the error kind name used in status payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "TransportError",
            Self::Validation { .. } => "ValidationError",
            Self::Synthesis { .. } => "SynthesisError",
            Self::File(_) => "FileError",
            Self::JobNotFound(_) => "JobNotFound",
            Self::Unauthorized(_) => "Unauthorized",
            Self::InvalidInput(_) => "InvalidInput",
            Self::Cancelled(_) => "Cancelled",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), json!(self.kind()));
        match self {
            Self::Transport { service, .. } | Self::Validation { service, .. } => {
                map.insert("service".to_string(), json!(service));
            }
            Self::Synthesis { slide_number, .. } => {
                map.insert("slide_number".to_string(), json!(slide_number));
            }
            Self::JobNotFound(id) => {
                map.insert("job_id".to_string(), json!(id.to_string()));
            }
            _ => {}
        }
        map.insert("message".to_string(), json!(self.to_string()));
        map
    }
}

impl From<serde_json::Error> for DeckflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::File(format!("serialization failed: {err}"))
    }
}

impl From<std::io::Error> for DeckflowError {
    fn from(err: std::io::Error) -> Self {
        Self::File(err.to_string())
    }
}
