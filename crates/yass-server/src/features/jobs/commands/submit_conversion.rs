use serde::{Deserialize, Serialize};
use yass_common::types::JobKind;

use super::SubmitJobResponse;
use crate::jobs::{JobPayload, JobQueue, QueueError};
use crate::tools::{ConversionParams, ToolError};

/// Published vocals and model to convert with; JSON only, since the inputs
/// are nested objects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitConversionCommand {
    #[serde(flatten)]
    pub params: ConversionParams,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitConversionError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl SubmitConversionCommand {
    pub fn validate(&self) -> Result<(), SubmitConversionError> {
        self.params.validate().map_err(|e| match e {
            ToolError::InvalidInput(message) => SubmitConversionError::Invalid(message),
            other => SubmitConversionError::Invalid(other.to_string()),
        })
    }
}

#[tracing::instrument(skip(queue, command), fields(model = %command.params.model.object_name))]
pub async fn handle(
    queue: &JobQueue,
    command: SubmitConversionCommand,
) -> Result<SubmitJobResponse, SubmitConversionError> {
    command.validate()?;

    let job_id = queue
        .submit(JobPayload::VoiceConversion(command.params))
        .await?;

    Ok(SubmitJobResponse {
        job_id,
        kind: JobKind::VoiceConversion,
    })
}
