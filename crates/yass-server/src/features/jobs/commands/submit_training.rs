use serde::{Deserialize, Serialize};
use yass_common::types::JobKind;

use super::SubmitJobResponse;
use crate::jobs::{JobPayload, JobQueue, QueueError};
use crate::tools::{ToolError, TrainingParams};

/// Model name, dataset location and optional hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTrainingCommand {
    #[serde(flatten)]
    pub params: TrainingParams,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitTrainingError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl SubmitTrainingCommand {
    pub fn validate(&self) -> Result<(), SubmitTrainingError> {
        self.params.validate().map_err(|e| match e {
            ToolError::InvalidInput(message) => SubmitTrainingError::Invalid(message),
            other => SubmitTrainingError::Invalid(other.to_string()),
        })
    }
}

#[tracing::instrument(skip(queue, command), fields(model = %command.params.model_name))]
pub async fn handle(
    queue: &JobQueue,
    command: SubmitTrainingCommand,
) -> Result<SubmitJobResponse, SubmitTrainingError> {
    command.validate()?;

    let job_id = queue.submit(JobPayload::VoiceTraining(command.params)).await?;

    Ok(SubmitJobResponse {
        job_id,
        kind: JobKind::VoiceTraining,
    })
}
