use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, instrument};
use yass_common::types::{ErrorDescriptor, JobOutput, JobState};

use super::clock::{to_chrono, Clock};
use super::store::{JobStore, JobStoreError};
use super::types::{Completion, JobId, JobPayload, JobRecord, NewJob};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {id} has no result yet (state: {state})")]
    NotReady { id: JobId, state: JobState },

    #[error("Job {id} failed: {}", .descriptor.message)]
    JobFailed {
        id: JobId,
        descriptor: ErrorDescriptor,
    },

    #[error(transparent)]
    Store(JobStoreError),
}

impl From<JobStoreError> for QueueError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(id) => QueueError::NotFound(id),
            other => QueueError::Store(other),
        }
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Submission, inspection and deferred scheduling on top of a [`JobStore`]
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    notify: Arc<Notify>,
    max_attempts: u32,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, clock: Arc<dyn Clock>, max_attempts: u32) -> Self {
        Self {
            store,
            clock,
            notify: Arc::new(Notify::new()),
            max_attempts,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Woken on every local submission
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Enqueue a job for immediate execution
    #[instrument(skip(self, payload), fields(kind = %payload.kind()))]
    pub async fn submit(&self, payload: JobPayload) -> QueueResult<JobId> {
        self.submit_after(payload, Duration::ZERO).await
    }

    /// Enqueue a job that becomes claimable after `delay`
    pub async fn submit_after(&self, payload: JobPayload, delay: Duration) -> QueueResult<JobId> {
        let now = self.clock.now();
        let record = self
            .store
            .insert(
                NewJob {
                    payload,
                    run_at: now + to_chrono(delay),
                    max_attempts: self.max_attempts,
                },
                now,
            )
            .await?;

        info!(job_id = %record.id, kind = %record.kind, delay_secs = delay.as_secs(), "Job submitted");
        self.notify.notify_one();
        Ok(record.id)
    }

    /// Queue a one-shot deletion of `bucket/object_name` after `delay`
    #[instrument(skip(self))]
    pub async fn schedule_deletion(
        &self,
        bucket: &str,
        object_name: &str,
        delay: Duration,
    ) -> QueueResult<JobId> {
        self.submit_after(
            JobPayload::ArtifactDeletion {
                bucket: bucket.to_string(),
                object_name: object_name.to_string(),
            },
            delay,
        )
        .await
    }

    pub async fn job(&self, id: JobId) -> QueueResult<JobRecord> {
        Ok(self.store.get(id).await?)
    }

    pub async fn status(&self, id: JobId) -> QueueResult<JobState> {
        Ok(self.store.get(id).await?.state)
    }

    /// Output of a succeeded job.
    ///
    /// Reading a failed job's result returns its descriptor every time and
    /// never schedules another attempt.
    pub async fn result(&self, id: JobId) -> QueueResult<JobOutput> {
        let record = self.store.get(id).await?;
        match record.state {
            JobState::Succeeded => Ok(record.output.unwrap_or_default()),
            JobState::Failed => Err(QueueError::JobFailed {
                id,
                descriptor: record.error.unwrap_or_else(|| ErrorDescriptor {
                    kind: yass_common::types::ErrorKind::ToolFailure,
                    message: record.last_error.unwrap_or_else(|| "unknown error".to_string()),
                    attempts: record.attempts,
                }),
            }),
            state => Err(QueueError::NotReady { id, state }),
        }
    }

    pub(crate) async fn claim(&self) -> QueueResult<Option<JobRecord>> {
        Ok(self.store.claim(self.clock.now()).await?)
    }

    pub(crate) async fn complete(
        &self,
        id: JobId,
        attempt: u32,
        completion: Completion,
    ) -> QueueResult<JobRecord> {
        let record = self
            .store
            .complete(id, attempt, completion, self.clock.now())
            .await?;
        debug!(job_id = %id, state = %record.state, "Job attempt recorded");
        Ok(record)
    }

    /// Tell the store attempt `attempt` of `id` is still alive
    pub(crate) async fn heartbeat(&self, id: JobId, attempt: u32) -> QueueResult<bool> {
        Ok(self.store.heartbeat(id, attempt, self.clock.now()).await?)
    }

    pub async fn ping(&self) -> QueueResult<()> {
        Ok(self.store.ping().await?)
    }
}
