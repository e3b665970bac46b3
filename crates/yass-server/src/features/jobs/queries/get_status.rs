use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use yass_common::types::{JobKind, JobState};

use crate::jobs::{JobId, JobQueue, QueueError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobStatusQuery {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub async fn handle(
    queue: &JobQueue,
    query: GetJobStatusQuery,
) -> Result<JobStatusResponse, QueueError> {
    let job = queue.job(query.job_id).await?;

    Ok(JobStatusResponse {
        job_id: job.id,
        kind: job.kind,
        state: job.state,
        attempts: job.attempts,
        max_attempts: job.max_attempts,
        created_at: job.created_at,
        updated_at: job.updated_at,
        last_error: job.last_error,
    })
}
