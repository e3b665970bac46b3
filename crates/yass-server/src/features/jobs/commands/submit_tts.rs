use serde::{Deserialize, Serialize};
use yass_common::types::JobKind;

use super::SubmitJobResponse;
use crate::jobs::{JobPayload, JobQueue, QueueError};
use crate::tools::{synthesizer::validate_request, ToolError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTtsCommand {
    pub text: String,
    pub voice: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitTtsError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl SubmitTtsCommand {
    pub fn validate(&self) -> Result<(), SubmitTtsError> {
        validate_request(&self.text, &self.voice).map_err(|e| match e {
            ToolError::InvalidInput(message) => SubmitTtsError::Invalid(message),
            other => SubmitTtsError::Invalid(other.to_string()),
        })
    }
}

#[tracing::instrument(skip(queue, command), fields(voice = %command.voice, chars = command.text.chars().count()))]
pub async fn handle(
    queue: &JobQueue,
    command: SubmitTtsCommand,
) -> Result<SubmitJobResponse, SubmitTtsError> {
    command.validate()?;

    let job_id = queue
        .submit(JobPayload::SpeechSynthesis {
            text: command.text,
            voice: command.voice,
        })
        .await?;

    Ok(SubmitJobResponse {
        job_id,
        kind: JobKind::SpeechSynthesis,
    })
}
