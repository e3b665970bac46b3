//! Worker pool
//!
//! Each worker loops: claim one job, run it to completion, record the
//! outcome, and consult the [`RetryPolicy`] on failure. Idle workers sleep
//! until a local submission wakes them or the poll interval elapses, which
//! also picks up delayed jobs and jobs submitted by other processes.
//!
//! While a job runs, its worker refreshes the claim every heartbeat interval
//! so the reaper only recovers attempts whose worker has actually gone away.
//! An attempt recovered anyway is superseded, and its late outcome is dropped.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use yass_common::types::{ErrorDescriptor, ErrorKind, JobOutput};

use super::clock::to_chrono;
use super::config::DEFAULT_HEARTBEAT_INTERVAL_SECS;
use super::policy::{RetryDecision, RetryPolicy};
use super::queue::{JobQueue, QueueError};
use super::store::JobStoreError;
use super::types::{Completion, JobRecord};

/// A failed attempt, classified for the retry policy
#[derive(Debug, Error)]
#[error("{message}")]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn descriptor(&self, attempts: u32) -> ErrorDescriptor {
        ErrorDescriptor {
            kind: self.kind,
            message: self.message.clone(),
            attempts,
        }
    }
}

impl From<crate::tools::ToolError> for JobError {
    fn from(err: crate::tools::ToolError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<crate::storage::StorageError> for JobError {
    fn from(err: crate::storage::StorageError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<crate::workspace::WorkspaceError> for JobError {
    fn from(err: crate::workspace::WorkspaceError) -> Self {
        Self::new(ErrorKind::ToolFailure, err.to_string())
    }
}

impl From<super::queue::QueueError> for JobError {
    fn from(err: super::queue::QueueError) -> Self {
        Self::new(ErrorKind::StorageFailure, err.to_string())
    }
}

/// Runs the body of a claimed job
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &JobRecord) -> Result<JobOutput, JobError>;
}

pub struct WorkerPool {
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    policy: RetryPolicy,
    workers: usize,
    poll_interval: Duration,
    heartbeat_interval: Duration,
    name: String,
}

impl WorkerPool {
    pub fn new(
        queue: JobQueue,
        handler: Arc<dyn JobHandler>,
        policy: RetryPolicy,
        workers: usize,
        poll_interval: Duration,
    ) -> Self {
        let name = hostname::get()
            .unwrap_or_else(|_| "unknown".into())
            .to_string_lossy()
            .to_string();
        Self {
            queue,
            handler,
            policy,
            workers,
            poll_interval,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            name,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Start the workers; they stop once `cancel` fires and their current job ends
    pub fn spawn(self, cancel: CancellationToken) -> WorkerPoolHandle {
        let pool = Arc::new(self);
        info!(workers = pool.workers, host = %pool.name, "Starting worker pool");

        let handles = (0..pool.workers)
            .map(|index| {
                let pool = pool.clone();
                let cancel = cancel.clone();
                let span = tracing::info_span!("worker", id = %format!("{}-{}", pool.name, index));
                tokio::spawn(async move { pool.run_worker(cancel).await }.instrument(span))
            })
            .collect();

        WorkerPoolHandle { handles }
    }

    async fn run_worker(&self, cancel: CancellationToken) {
        let notify = self.queue.notifier();
        debug!("Worker started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!(error = %e, "Failed to claim or record a job"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        debug!("Worker stopped");
    }

    /// Claim and process at most one job; `Ok(false)` when nothing was due
    pub async fn run_once(&self) -> Result<bool, super::queue::QueueError> {
        let Some(job) = self.queue.claim().await? else {
            return Ok(false);
        };

        let span = tracing::info_span!(
            "job",
            job_id = %job.id,
            kind = %job.kind,
            attempt = job.attempts
        );
        self.process(job).instrument(span).await?;
        Ok(true)
    }

    /// Run the handler, refreshing the claim until it returns
    async fn run_handler(&self, job: &JobRecord) -> Result<JobOutput, JobError> {
        let work = AssertUnwindSafe(self.handler.handle(job)).catch_unwind();
        tokio::pin!(work);

        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                outcome = &mut work => {
                    return outcome.unwrap_or_else(|_| {
                        Err(JobError::new(ErrorKind::ToolFailure, "job handler panicked"))
                    });
                }
                _ = ticker.tick() => match self.queue.heartbeat(job.id, job.attempts).await {
                    Ok(true) => debug!("Heartbeat"),
                    Ok(false) => warn!("Claim lost while the job is still running"),
                    Err(e) => warn!(error = %e, "Heartbeat failed"),
                },
            }
        }
    }

    async fn process(&self, job: JobRecord) -> Result<(), super::queue::QueueError> {
        info!("Job started");

        let outcome = self.run_handler(&job).await;

        let completion = match outcome {
            Ok(output) => {
                info!(artifacts = output.artifacts.len(), "Job succeeded");
                Completion::Succeeded(output)
            }
            Err(err) => match self.policy.decide(err.kind, job.attempts) {
                RetryDecision::Retry { delay } => {
                    warn!(error = %err, retry_in_secs = delay.as_secs(), "Job attempt failed, will retry");
                    Completion::Retry {
                        error: err.descriptor(job.attempts),
                        retry_at: self.queue.clock().now() + to_chrono(delay),
                    }
                }
                RetryDecision::Fail => {
                    error!(error = %err, kind = ?err.kind, "Job failed");
                    Completion::Failed(err.descriptor(job.attempts))
                }
            },
        };

        match self.queue.complete(job.id, job.attempts, completion).await {
            Ok(_) => Ok(()),
            Err(QueueError::Store(JobStoreError::Superseded { .. })) => {
                warn!("Attempt was superseded, dropping its outcome");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

pub struct WorkerPoolHandle {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Wait for every worker to exit
    pub async fn join(self) {
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::jobs::clock::TokioClock;
    use crate::jobs::memory::MemoryJobStore;
    use crate::jobs::reaper::{Reaper, ReaperConfig};
    use crate::jobs::types::JobPayload;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use yass_common::types::JobState;

    /// Fails with `kind` every time and records when it was called
    struct AlwaysFails {
        kind: ErrorKind,
        calls: Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl JobHandler for AlwaysFails {
        async fn handle(&self, _job: &JobRecord) -> Result<JobOutput, JobError> {
            self.calls.lock().push(tokio::time::Instant::now());
            Err(JobError::new(self.kind, "upstream down"))
        }
    }

    struct Succeeds(AtomicUsize);

    #[async_trait]
    impl JobHandler for Succeeds {
        async fn handle(&self, _job: &JobRecord) -> Result<JobOutput, JobError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(JobOutput::default())
        }
    }

    /// Takes the given tokio time, then succeeds
    struct Slow(Duration);

    #[async_trait]
    impl JobHandler for Slow {
        async fn handle(&self, _job: &JobRecord) -> Result<JobOutput, JobError> {
            tokio::time::sleep(self.0).await;
            Ok(JobOutput::default())
        }
    }

    struct Panics;

    #[async_trait]
    impl JobHandler for Panics {
        async fn handle(&self, _job: &JobRecord) -> Result<JobOutput, JobError> {
            panic!("tool crashed");
        }
    }

    fn queue() -> JobQueue {
        JobQueue::new(
            Arc::new(MemoryJobStore::new()),
            Arc::new(TokioClock::new()),
            3,
        )
    }

    fn payload() -> JobPayload {
        JobPayload::AudioSeparation {
            source_url: "https://youtu.be/abc".to_string(),
        }
    }

    fn pool(queue: &JobQueue, handler: Arc<dyn JobHandler>) -> WorkerPool {
        WorkerPool::new(
            queue.clone(),
            handler,
            RetryPolicy::default(),
            2,
            Duration::from_millis(100),
        )
    }

    async fn wait_for_state(queue: &JobQueue, id: crate::jobs::types::JobId, state: JobState) {
        for _ in 0..10_000 {
            if queue.status(id).await.unwrap() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job never reached {}", state);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_job_stops_after_three_spaced_attempts() {
        let queue = queue();
        let handler = Arc::new(AlwaysFails {
            kind: ErrorKind::UpstreamUnavailable,
            calls: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();
        let handle = pool(&queue, handler.clone()).spawn(cancel.clone());

        let id = queue.submit(payload()).await.unwrap();
        wait_for_state(&queue, id, JobState::Failed).await;

        let calls = handler.calls.lock().clone();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(10));
        }

        match queue.result(id).await {
            Err(crate::jobs::QueueError::JobFailed { descriptor, .. }) => {
                assert_eq!(descriptor.attempts, 3);
                assert_eq!(descriptor.kind, ErrorKind::UpstreamUnavailable);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Nothing else is attempted afterwards.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(handler.calls.lock().len(), 3);

        cancel.cancel();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_error_is_not_retried() {
        let queue = queue();
        let handler = Arc::new(AlwaysFails {
            kind: ErrorKind::Validation,
            calls: Mutex::new(Vec::new()),
        });
        let worker = pool(&queue, handler.clone());

        let id = queue.submit(payload()).await.unwrap();
        assert!(worker.run_once().await.unwrap());

        assert_eq!(queue.status(id).await.unwrap(), JobState::Failed);
        assert_eq!(handler.calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_waits_for_backoff() {
        let queue = queue();
        let handler = Arc::new(AlwaysFails {
            kind: ErrorKind::ToolFailure,
            calls: Mutex::new(Vec::new()),
        });
        let worker = pool(&queue, handler);

        let id = queue.submit(payload()).await.unwrap();
        assert!(worker.run_once().await.unwrap());
        assert_eq!(queue.status(id).await.unwrap(), JobState::FailedRetryable);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!worker.run_once().await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(worker.run_once().await.unwrap());
        assert_eq!(queue.job(id).await.unwrap().attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_wakes_idle_worker() {
        let queue = queue();
        let handler = Arc::new(Succeeds(AtomicUsize::new(0)));
        let cancel = CancellationToken::new();
        let handle = WorkerPool::new(
            queue.clone(),
            handler.clone(),
            RetryPolicy::default(),
            1,
            Duration::from_secs(3600),
        )
        .spawn(cancel.clone());

        tokio::task::yield_now().await;
        let id = queue.submit(payload()).await.unwrap();
        wait_for_state(&queue, id, JobState::Succeeded).await;
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.join().await;
    }

    #[tokio::test]
    async fn test_panicking_handler_is_a_tool_failure() {
        let queue = queue();
        let worker = pool(&queue, Arc::new(Panics));

        let id = queue.submit(payload()).await.unwrap();
        assert!(worker.run_once().await.unwrap());

        let job = queue.job(id).await.unwrap();
        assert_eq!(job.state, JobState::FailedRetryable);
        assert_eq!(job.last_error.as_deref(), Some("job handler panicked"));
    }

    fn reaper(queue: &JobQueue) -> Reaper {
        Reaper::new(
            queue.clone(),
            ReaperConfig {
                result_retention: Duration::from_secs(24 * 3600),
                stale_after: Duration::from_secs(3600),
                interval: Duration::from_secs(300),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_job_with_heartbeat_is_not_recovered() {
        let queue = queue();
        let worker = pool(&queue, Arc::new(Slow(Duration::from_secs(2 * 3600))))
            .with_heartbeat_interval(Duration::from_secs(60));

        let id = queue.submit(payload()).await.unwrap();
        let running = tokio::spawn(async move { worker.run_once().await });

        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(reaper(&queue).run_once().await.unwrap().recovered, 0);
        assert!(queue.claim().await.unwrap().is_none());

        assert!(running.await.unwrap().unwrap());
        let job = queue.job(id).await.unwrap();
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_attempt_does_not_overwrite_newer_claim() {
        let queue = queue();
        // No heartbeat inside the stale window, so the reaper takes the job back.
        let worker = pool(&queue, Arc::new(Slow(Duration::from_secs(2 * 3600))))
            .with_heartbeat_interval(Duration::from_secs(3 * 3600));

        let id = queue.submit(payload()).await.unwrap();
        let running = tokio::spawn(async move { worker.run_once().await });

        tokio::time::sleep(Duration::from_secs(3601)).await;
        assert_eq!(reaper(&queue).run_once().await.unwrap().recovered, 1);
        let second = queue.claim().await.unwrap().unwrap();
        assert_eq!(second.attempts, 2);

        // The first attempt finishes late; its outcome is dropped.
        assert!(running.await.unwrap().unwrap());
        let job = queue.job(id).await.unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.attempts, 2);

        let record = queue
            .complete(id, second.attempts, Completion::Succeeded(JobOutput::default()))
            .await
            .unwrap();
        assert_eq!(record.state, JobState::Succeeded);
    }
}
