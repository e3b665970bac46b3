use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use yass_common::types::JobState;

use super::store::{
    apply_completion, check_attempt, check_transition, lost_worker_error, JobStore, JobStoreError,
    StoreResult,
};
use super::types::{Completion, JobId, JobRecord, NewJob};

struct Entry {
    /// Insertion order, breaks `run_at` ties
    seq: u64,
    record: JobRecord,
}

#[derive(Default)]
struct Table {
    next_seq: u64,
    jobs: HashMap<JobId, Entry>,
}

/// Single-process job store
#[derive(Default)]
pub struct MemoryJobStore {
    table: Mutex<Table>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: NewJob, now: DateTime<Utc>) -> StoreResult<JobRecord> {
        let record = JobRecord::new(job, now);
        let mut table = self.table.lock();
        let seq = table.next_seq;
        table.next_seq += 1;
        table.jobs.insert(
            record.id,
            Entry {
                seq,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    async fn get(&self, id: JobId) -> StoreResult<JobRecord> {
        self.table
            .lock()
            .jobs
            .get(&id)
            .map(|e| e.record.clone())
            .ok_or(JobStoreError::NotFound(id))
    }

    async fn claim(&self, now: DateTime<Utc>) -> StoreResult<Option<JobRecord>> {
        let mut table = self.table.lock();

        for entry in table.jobs.values_mut() {
            let record = &mut entry.record;
            if record.state == JobState::FailedRetryable && record.run_at <= now {
                record.state = JobState::Pending;
                record.updated_at = now;
            }
        }

        let next = table
            .jobs
            .values()
            .filter(|e| e.record.state == JobState::Pending && e.record.run_at <= now)
            .min_by_key(|e| (e.record.run_at, e.seq))
            .map(|e| e.record.id);

        let Some(id) = next else {
            return Ok(None);
        };
        let Some(entry) = table.jobs.get_mut(&id) else {
            return Ok(None);
        };

        let record = &mut entry.record;
        record.state = JobState::Running;
        record.attempts += 1;
        record.updated_at = now;
        Ok(Some(record.clone()))
    }

    async fn complete(
        &self,
        id: JobId,
        attempt: u32,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> StoreResult<JobRecord> {
        let mut table = self.table.lock();
        let entry = table.jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        let record = &mut entry.record;

        check_attempt(id, record.attempts, attempt)?;
        check_transition(id, record.state, completion.target_state())?;
        apply_completion(record, completion, now);
        Ok(record.clone())
    }

    async fn heartbeat(&self, id: JobId, attempt: u32, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut table = self.table.lock();
        let entry = table.jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        let record = &mut entry.record;

        if record.state != JobState::Running || record.attempts != attempt {
            return Ok(false);
        }
        record.updated_at = now;
        Ok(true)
    }

    async fn recover_stale(
        &self,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut table = self.table.lock();
        let mut recovered = 0;

        for entry in table.jobs.values_mut() {
            let record = &mut entry.record;
            if record.state != JobState::Running || record.updated_at >= stale_before {
                continue;
            }
            let error = lost_worker_error(record.attempts);
            let completion = if record.attempts < record.max_attempts {
                Completion::Retry {
                    error,
                    retry_at: now,
                }
            } else {
                Completion::Failed(error)
            };
            apply_completion(record, completion, now);
            recovered += 1;
        }

        Ok(recovered)
    }

    async fn purge_finished(&self, finished_before: DateTime<Utc>) -> StoreResult<u64> {
        let mut table = self.table.lock();
        let before = table.jobs.len();
        table.jobs.retain(|_, e| {
            !(e.record.state.is_terminal()
                && e.record
                    .finished_at
                    .map(|t| t < finished_before)
                    .unwrap_or(false))
        });
        Ok((before - table.jobs.len()) as u64)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::jobs::types::JobPayload;
    use chrono::Duration;
    use yass_common::types::{ErrorDescriptor, ErrorKind, JobOutput};

    fn tts_job(run_at: DateTime<Utc>) -> NewJob {
        NewJob {
            payload: JobPayload::SpeechSynthesis {
                text: "hello".to_string(),
                voice: "en-US-AriaNeural".to_string(),
            },
            run_at,
            max_attempts: 3,
        }
    }

    fn descriptor(attempts: u32) -> ErrorDescriptor {
        ErrorDescriptor {
            kind: ErrorKind::ToolFailure,
            message: "boom".to_string(),
            attempts,
        }
    }

    #[tokio::test]
    async fn test_claim_is_fifo_and_exclusive() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let first = store.insert(tts_job(now), now).await.unwrap();
        let second = store.insert(tts_job(now), now).await.unwrap();

        let a = store.claim(now).await.unwrap().unwrap();
        let b = store.claim(now).await.unwrap().unwrap();
        assert_eq!(a.id, first.id);
        assert_eq!(b.id, second.id);
        assert_eq!(a.state, JobState::Running);
        assert_eq!(a.attempts, 1);
        assert!(store.claim(now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delayed_job_not_claimable_early() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        store
            .insert(tts_job(now + Duration::seconds(600)), now)
            .await
            .unwrap();

        assert!(store
            .claim(now + Duration::seconds(599))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .claim(now + Duration::seconds(600))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_retry_path_goes_back_to_pending() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let job = store.insert(tts_job(now), now).await.unwrap();
        store.claim(now).await.unwrap().unwrap();

        let retry_at = now + Duration::seconds(10);
        let record = store
            .complete(
                job.id,
                1,
                Completion::Retry {
                    error: descriptor(1),
                    retry_at,
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(record.state, JobState::FailedRetryable);
        assert_eq!(record.last_error.as_deref(), Some("boom"));

        assert!(store
            .claim(now + Duration::seconds(9))
            .await
            .unwrap()
            .is_none());
        let again = store.claim(retry_at).await.unwrap().unwrap();
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test]
    async fn test_terminal_states_reject_completion() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let job = store.insert(tts_job(now), now).await.unwrap();

        // Not running yet.
        let err = store
            .complete(job.id, 0, Completion::Succeeded(JobOutput::default()), now)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobStoreError::InvalidTransition {
                from: JobState::Pending,
                to: JobState::Succeeded,
                ..
            }
        ));

        store.claim(now).await.unwrap();
        store
            .complete(job.id, 1, Completion::Failed(descriptor(1)), now)
            .await
            .unwrap();

        let err = store
            .complete(job.id, 1, Completion::Succeeded(JobOutput::default()), now)
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidTransition { .. }));
        assert_eq!(
            store.get(job.id).await.unwrap().error.unwrap().attempts,
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = MemoryJobStore::new();
        let id = uuid::Uuid::new_v4();
        assert!(matches!(
            store.get(id).await,
            Err(JobStoreError::NotFound(found)) if found == id
        ));
    }

    #[tokio::test]
    async fn test_purge_only_old_finished_jobs() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let done = store.insert(tts_job(now), now).await.unwrap();
        let waiting = store.insert(tts_job(now), now).await.unwrap();
        store.claim(now).await.unwrap();
        store
            .complete(done.id, 1, Completion::Succeeded(JobOutput::default()), now)
            .await
            .unwrap();

        assert_eq!(store.purge_finished(now).await.unwrap(), 0);
        assert_eq!(
            store
                .purge_finished(now + Duration::seconds(1))
                .await
                .unwrap(),
            1
        );
        assert!(store.get(done.id).await.is_err());
        assert!(store.get(waiting.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_recover_stale_running_jobs() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let job = store.insert(tts_job(now), now).await.unwrap();
        store.claim(now).await.unwrap();

        let later = now + Duration::hours(2);
        assert_eq!(
            store
                .recover_stale(later - Duration::hours(1), later)
                .await
                .unwrap(),
            1
        );
        let record = store.get(job.id).await.unwrap();
        assert_eq!(record.state, JobState::FailedRetryable);

        let again = store.claim(later).await.unwrap().unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test]
    async fn test_recovered_attempt_cannot_overwrite_newer_one() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let job = store.insert(tts_job(now), now).await.unwrap();
        let first = store.claim(now).await.unwrap().unwrap();

        // The first worker goes quiet long enough to be recovered.
        let later = now + Duration::hours(2);
        store
            .recover_stale(later - Duration::hours(1), later)
            .await
            .unwrap();
        let second = store.claim(later).await.unwrap().unwrap();
        assert_eq!(second.attempts, 2);

        assert!(!store.heartbeat(job.id, first.attempts, later).await.unwrap());
        let err = store
            .complete(
                job.id,
                first.attempts,
                Completion::Succeeded(JobOutput::default()),
                later,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobStoreError::Superseded { attempt: 1, .. }
        ));
        assert_eq!(store.get(job.id).await.unwrap().state, JobState::Running);

        let record = store
            .complete(
                job.id,
                second.attempts,
                Completion::Succeeded(JobOutput::default()),
                later,
            )
            .await
            .unwrap();
        assert_eq!(record.state, JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_running_job_fresh() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let job = store.insert(tts_job(now), now).await.unwrap();
        let claimed = store.claim(now).await.unwrap().unwrap();

        let beat = now + Duration::minutes(50);
        assert!(store.heartbeat(job.id, claimed.attempts, beat).await.unwrap());

        let later = now + Duration::minutes(90);
        assert_eq!(
            store
                .recover_stale(later - Duration::hours(1), later)
                .await
                .unwrap(),
            0
        );
        let record = store.get(job.id).await.unwrap();
        assert_eq!(record.state, JobState::Running);
        assert_eq!(record.updated_at, beat);
    }
}
