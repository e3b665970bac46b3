use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use yass_common::types::{ErrorDescriptor, ErrorKind, JobState};

use super::types::{Completion, JobId, JobRecord, NewJob};

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },

    /// The attempt was recovered and the job has moved on without it
    #[error("Attempt {attempt} of job {id} was superseded")]
    Superseded { id: JobId, attempt: u32 },

    #[error("Corrupt job record {id}: {message}")]
    Corrupt { id: JobId, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, JobStoreError>;

/// Persistence for jobs
///
/// Every time value is supplied by the caller, so backends never consult a
/// clock of their own.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: NewJob, now: DateTime<Utc>) -> StoreResult<JobRecord>;

    async fn get(&self, id: JobId) -> StoreResult<JobRecord>;

    /// Move due `failed_retryable` jobs back to `pending`, then take the oldest
    /// due `pending` job, mark it `running` and count the attempt.
    ///
    /// At most one caller ever receives a given claim.
    async fn claim(&self, now: DateTime<Utc>) -> StoreResult<Option<JobRecord>>;

    /// Record how attempt `attempt` of a `running` job ended.
    ///
    /// Fails with [`JobStoreError::Superseded`] when the job has been claimed
    /// again since, so a worker that lost its claim cannot overwrite the
    /// outcome of a newer attempt.
    async fn complete(
        &self,
        id: JobId,
        attempt: u32,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> StoreResult<JobRecord>;

    /// Refresh `updated_at` of a job still `running` attempt `attempt`.
    ///
    /// Returns `false` when the attempt is no longer the current one.
    async fn heartbeat(&self, id: JobId, attempt: u32, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Hand `running` jobs last touched before `stale_before` back to the
    /// retry path, or fail them when they are out of attempts.
    async fn recover_stale(
        &self,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Delete finished jobs that finished before `finished_before`
    async fn purge_finished(&self, finished_before: DateTime<Utc>) -> StoreResult<u64>;

    /// Cheap reachability check
    async fn ping(&self) -> StoreResult<()>;
}

/// Descriptor recorded when a worker disappeared mid-attempt
pub(crate) fn lost_worker_error(attempts: u32) -> ErrorDescriptor {
    ErrorDescriptor {
        kind: ErrorKind::ToolFailure,
        message: "worker stopped before the attempt finished".to_string(),
        attempts,
    }
}

pub(crate) fn check_attempt(id: JobId, current: u32, attempt: u32) -> StoreResult<()> {
    if current == attempt {
        Ok(())
    } else {
        Err(JobStoreError::Superseded { id, attempt })
    }
}

pub(crate) fn check_transition(
    id: JobId,
    from: JobState,
    to: JobState,
) -> StoreResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(JobStoreError::InvalidTransition { id, from, to })
    }
}

/// Apply `completion` to a record already known to be `running`
pub(crate) fn apply_completion(record: &mut JobRecord, completion: Completion, now: DateTime<Utc>) {
    record.state = completion.target_state();
    record.updated_at = now;
    match completion {
        Completion::Succeeded(output) => {
            record.output = Some(output);
            record.finished_at = Some(now);
        }
        Completion::Retry { error, retry_at } => {
            record.last_error = Some(error.message);
            record.run_at = retry_at;
        }
        Completion::Failed(error) => {
            record.last_error = Some(error.message.clone());
            record.error = Some(error);
            record.finished_at = Some(now);
        }
    }
}
