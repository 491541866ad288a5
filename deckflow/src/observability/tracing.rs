//! Tracing subscriber setup and timing helpers.

use crate::errors::DeckflowError;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Installs a global `tracing` subscriber for binaries embedding the crate.
///
/// `RUST_LOG` wins over `default_filter` when set. Fails if a subscriber is
/// already installed.
pub fn init_tracing(default_filter: &str, format: LogFormat) -> Result<(), DeckflowError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| DeckflowError::InvalidInput(format!("invalid log filter: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    result.map_err(|e| DeckflowError::Internal(format!("tracing already initialized: {e}")))
}

/// Creates the span a job runs in.
#[must_use]
pub fn job_span(job_id: Uuid, topic: &str, slide_count: usize) -> tracing::Span {
    tracing::info_span!("job", job_id = %job_id, topic = %topic, slide_count)
}

/// Wall-clock timer for stages and whole jobs.
#[derive(Debug)]
pub struct StageTimer {
    start: Instant,
    name: String,
}

impl StageTimer {
    /// Starts a timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the timer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns elapsed whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
