//! Job records as the store sees them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use yass_common::types::{ErrorDescriptor, JobKind, JobOutput, JobState};

use crate::tools::{ConversionParams, TrainingParams};

pub type JobId = Uuid;

/// Job parameters, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    SpeechSynthesis { text: String, voice: String },
    AudioSeparation { source_url: String },
    VoiceTraining(TrainingParams),
    VoiceConversion(ConversionParams),
    ArtifactDeletion { bucket: String, object_name: String },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::SpeechSynthesis { .. } => JobKind::SpeechSynthesis,
            JobPayload::AudioSeparation { .. } => JobKind::AudioSeparation,
            JobPayload::VoiceTraining(_) => JobKind::VoiceTraining,
            JobPayload::VoiceConversion(_) => JobKind::VoiceConversion,
            JobPayload::ArtifactDeletion { .. } => JobKind::ArtifactDeletion,
        }
    }
}

/// A job to be inserted
#[derive(Debug, Clone)]
pub struct NewJob {
    pub payload: JobPayload,
    pub run_at: DateTime<Utc>,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: JobPayload,
    pub state: JobState,
    /// Incremented on every claim
    pub attempts: u32,
    pub max_attempts: u32,
    /// Earliest time a worker may claim the job
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: Option<JobOutput>,
    pub error: Option<ErrorDescriptor>,
    /// Message of the most recent failed attempt
    pub last_error: Option<String>,
}

impl JobRecord {
    pub fn new(job: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: job.payload.kind(),
            payload: job.payload,
            state: JobState::Pending,
            attempts: 0,
            max_attempts: job.max_attempts,
            run_at: job.run_at,
            created_at: now,
            updated_at: now,
            finished_at: None,
            output: None,
            error: None,
            last_error: None,
        }
    }
}

/// How an attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Succeeded(JobOutput),
    /// Recoverable failure; the job becomes claimable again at `retry_at`
    Retry {
        error: ErrorDescriptor,
        retry_at: DateTime<Utc>,
    },
    Failed(ErrorDescriptor),
}

impl Completion {
    pub fn target_state(&self) -> JobState {
        match self {
            Completion::Succeeded(_) => JobState::Succeeded,
            Completion::Retry { .. } => JobState::FailedRetryable,
            Completion::Failed(_) => JobState::Failed,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_tagging() {
        let payload = JobPayload::ArtifactDeletion {
            bucket: "tts-bucket".to_string(),
            object_name: "x.mp3".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "artifact_deletion");
        assert_eq!(json["bucket"], "tts-bucket");
        assert_eq!(payload.kind(), JobKind::ArtifactDeletion);
    }

    #[test]
    fn test_training_payload_is_flattened() {
        let json = serde_json::json!({
            "kind": "voice_training",
            "model_name": "minji",
            "dataset_path": "/data/minji",
            "total_epochs": 20
        });
        let payload: JobPayload = serde_json::from_value(json).unwrap();
        match payload {
            JobPayload::VoiceTraining(params) => {
                assert_eq!(params.model_name, "minji");
                assert_eq!(params.total_epochs, 20);
                assert_eq!(params.batch_size, 8);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_conversion_payload_is_flattened() {
        let json = serde_json::json!({
            "kind": "voice_conversion",
            "vocals": {"bucket": "separation-bucket", "object_name": "v.wav"},
            "model": {"bucket": "training-bucket", "object_name": "minji.pth"},
            "pitch": -2
        });
        let payload: JobPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.kind(), JobKind::VoiceConversion);
        match payload {
            JobPayload::VoiceConversion(params) => {
                assert_eq!(params.pitch, -2);
                assert_eq!(params.model.object_name, "minji.pth");
                assert!(params.index.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_new_record_is_pending() {
        let now = Utc::now();
        let record = JobRecord::new(
            NewJob {
                payload: JobPayload::AudioSeparation {
                    source_url: "https://youtu.be/abc".to_string(),
                },
                run_at: now,
                max_attempts: 3,
            },
            now,
        );
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.attempts, 0);
        assert_eq!(record.kind, JobKind::AudioSeparation);
    }
}
