//! Handle to a running job task.

use crate::cancellation::CancellationToken;
use crate::errors::DeckflowError;
use crate::jobs::JobStatusView;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A job running detached on its own task.
///
/// Dropping the handle does not stop the job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: Uuid,
    token: Arc<CancellationToken>,
    join: JoinHandle<JobStatusView>,
}

impl JobHandle {
    pub(crate) fn new(job_id: Uuid, token: Arc<CancellationToken>, join: JoinHandle<JobStatusView>) -> Self {
        Self {
            job_id,
            token,
            join,
        }
    }

    /// Returns the job id.
    #[must_use]
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Requests cancellation. The job stops at its next stage boundary.
    ///
    /// Returns false if cancellation was already requested.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.token.cancel(reason)
    }

    /// Returns true once the job task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the job to reach a terminal status.
    pub async fn wait(self) -> Result<JobStatusView, DeckflowError> {
        self.join
            .await
            .map_err(|e| DeckflowError::Internal(format!("job task {} failed: {e}", self.job_id)))
    }
}
