//! Job storage.

use super::Job;
use crate::errors::DeckflowError;
use chrono::Utc;
use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

/// Storage for job state, shared by the runner (writer) and pollers (readers).
///
/// Readers receive snapshots. Implementations enforce two invariants on
/// every update: reported progress never decreases, and a terminal job
/// never leaves its terminal status.
pub trait JobStore: Send + Sync {
    /// Inserts a new job. Fails if the id is taken.
    fn insert(&self, job: Job) -> Result<(), DeckflowError>;

    /// Returns a snapshot of the job.
    fn get(&self, job_id: Uuid) -> Result<Job, DeckflowError>;

    /// Applies a mutation and returns the resulting snapshot.
    fn update(&self, job_id: Uuid, apply: &mut dyn FnMut(&mut Job)) -> Result<Job, DeckflowError>;

    /// Returns the ids of all stored jobs.
    fn job_ids(&self) -> Vec<Uuid>;
}

/// In-process [`JobStore`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<Uuid, Job>,
}

impl InMemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if no jobs are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<(), DeckflowError> {
        match self.jobs.entry(job.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(DeckflowError::Internal(format!(
                "job {} already exists",
                job.id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    fn get(&self, job_id: Uuid) -> Result<Job, DeckflowError> {
        self.jobs
            .get(&job_id)
            .map(|entry| entry.value().clone())
            .ok_or(DeckflowError::JobNotFound(job_id))
    }

    fn update(&self, job_id: Uuid, apply: &mut dyn FnMut(&mut Job)) -> Result<Job, DeckflowError> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or(DeckflowError::JobNotFound(job_id))?;
        let job = entry.value_mut();
        let previous = job.clone();

        apply(job);

        if previous.status.is_terminal() && job.status != previous.status {
            warn!(
                job_id = %job_id,
                from = %previous.status,
                to = %job.status,
                "Ignoring update that changes a terminal job's status"
            );
            *job = previous;
            return Ok(job.clone());
        }
        if job.progress.completion_percent < previous.progress.completion_percent {
            job.progress.completion_percent = previous.progress.completion_percent;
        }
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    fn job_ids(&self) -> Vec<Uuid> {
        self.jobs.iter().map(|entry| *entry.key()).collect()
    }
}
