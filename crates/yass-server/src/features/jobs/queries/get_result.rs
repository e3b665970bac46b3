use serde::{Deserialize, Serialize};
use yass_common::types::{JobOutput, JobState};

use crate::jobs::{JobId, JobQueue, QueueError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobResultQuery {
    pub job_id: JobId,
}

/// Either the output of a succeeded job or just the state of one still in flight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultResponse {
    pub job_id: JobId,
    pub state: JobState,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
}

/// Terminal failures come back as [`QueueError::JobFailed`].
pub async fn handle(
    queue: &JobQueue,
    query: GetJobResultQuery,
) -> Result<JobResultResponse, QueueError> {
    match queue.result(query.job_id).await {
        Ok(output) => Ok(JobResultResponse {
            job_id: query.job_id,
            state: JobState::Succeeded,
            output: Some(output),
        }),
        Err(QueueError::NotReady { id, state }) => Ok(JobResultResponse {
            job_id: id,
            state,
            output: None,
        }),
        Err(e) => Err(e),
    }
}
