//! Wire types shared across YASS
//!
//! These are the shapes clients see when polling jobs and the shapes the job
//! store persists, so they live outside the server crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::YassError;

/// Kind of work a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    SpeechSynthesis,
    AudioSeparation,
    VoiceTraining,
    VoiceConversion,
    /// Internal: removes a published artifact once its retention window ends
    ArtifactDeletion,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SpeechSynthesis => "speech_synthesis",
            JobKind::AudioSeparation => "audio_separation",
            JobKind::VoiceTraining => "voice_training",
            JobKind::VoiceConversion => "voice_conversion",
            JobKind::ArtifactDeletion => "artifact_deletion",
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = YassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "speech_synthesis" => Ok(JobKind::SpeechSynthesis),
            "audio_separation" => Ok(JobKind::AudioSeparation),
            "voice_training" => Ok(JobKind::VoiceTraining),
            "voice_conversion" => Ok(JobKind::VoiceConversion),
            "artifact_deletion" => Ok(JobKind::ArtifactDeletion),
            other => Err(YassError::InvalidKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job
///
/// ```text
/// pending ──► running ──► succeeded
///    ▲           │
///    │           ├──► failed_retryable ──► pending
///    │           │
///    └───────────┴──► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    /// Failed with a recoverable error; waiting out the backoff delay
    FailedRetryable,
    /// Failed for good
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::FailedRetryable => "failed_retryable",
            JobState::Failed => "failed",
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::FailedRetryable)
                | (JobState::Running, JobState::Failed)
                | (JobState::FailedRetryable, JobState::Pending)
        )
    }
}

impl std::str::FromStr for JobState {
    type Err = YassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "running" => Ok(JobState::Running),
            "succeeded" => Ok(JobState::Succeeded),
            "failed_retryable" => Ok(JobState::FailedRetryable),
            "failed" => Ok(JobState::Failed),
            other => Err(YassError::InvalidState(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy used for retry decisions and HTTP mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input; never retried
    Validation,
    /// Source or tool failing transiently
    UpstreamUnavailable,
    /// Artifact or workspace file missing
    ResourceNotFound,
    /// External tool exited nonzero or produced nothing
    ToolFailure,
    /// Upload or delete failed
    StorageFailure,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::UpstreamUnavailable | ErrorKind::ToolFailure | ErrorKind::StorageFailure
        )
    }
}

/// Error recorded on a job once it fails for good
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

/// A published object in the artifact store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Logical role within the job output, e.g. `vocals` or `speech`
    pub role: String,
    pub bucket: String,
    pub object_name: String,
    pub url: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
    /// When the deferred deletion removes the object
    pub expires_at: DateTime<Utc>,
}

/// A link to a file still held in a local workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLink {
    pub role: String,
    pub path: String,
}

/// What a successful job produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutput {
    pub artifacts: Vec<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamLink>,
}

impl JobOutput {
    pub fn artifact(&self, role: &str) -> Option<&ArtifactRef> {
        self.artifacts.iter().find(|a| a.role == role)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_round_trips_through_str() {
        for state in [
            JobState::Pending,
            JobState::Running,
            JobState::Succeeded,
            JobState::FailedRetryable,
            JobState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("cancelled".parse::<JobState>().is_err());
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        for next in [
            JobState::Pending,
            JobState::Running,
            JobState::Succeeded,
            JobState::FailedRetryable,
            JobState::Failed,
        ] {
            assert!(!JobState::Succeeded.can_transition_to(next));
            assert!(!JobState::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_retry_path_is_the_only_regression() {
        assert!(JobState::FailedRetryable.can_transition_to(JobState::Pending));
        assert!(!JobState::Running.can_transition_to(JobState::Pending));
        assert!(!JobState::Pending.can_transition_to(JobState::Succeeded));
    }

    #[test]
    fn test_error_kind_retryability() {
        assert!(ErrorKind::UpstreamUnavailable.is_retryable());
        assert!(ErrorKind::ToolFailure.is_retryable());
        assert!(ErrorKind::StorageFailure.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::ResourceNotFound.is_retryable());
    }

    #[test]
    fn test_job_kind_serde_names() {
        let json = serde_json::to_string(&JobKind::AudioSeparation).unwrap();
        assert_eq!(json, "\"audio_separation\"");
        assert_eq!(
            "speech_synthesis".parse::<JobKind>().unwrap(),
            JobKind::SpeechSynthesis
        );
        assert_eq!(
            "voice_conversion".parse::<JobKind>().unwrap(),
            JobKind::VoiceConversion
        );
    }

    #[test]
    fn test_job_output_skips_empty_streams() {
        let output = JobOutput::default();
        let json = serde_json::to_value(&output).unwrap();
        assert!(json.get("streams").is_none());
    }
}
