//! Audio separation submission
//!
//! The source is probed before anything is queued: it must exist, report a
//! duration, and be no longer than the configured ceiling.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use yass_common::types::JobKind;

use super::SubmitJobResponse;
use crate::features::shared::{validate_source_url, UrlValidationError};
use crate::jobs::{JobPayload, JobQueue, QueueError};
use crate::tools::{Downloader, ToolError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSeparationCommand {
    pub source_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitSeparationError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),
    #[error("{0}")]
    SourceUnavailable(String),
    #[error("Could not determine the duration of the source")]
    DurationUnknown,
    #[error("Source is {duration:.0}s long; the limit is {max}s")]
    TooLong { duration: f64, max: u64 },
    #[error("Could not inspect the source: {0}")]
    ProbeFailed(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl SubmitSeparationCommand {
    pub fn validate(&self) -> Result<(), SubmitSeparationError> {
        validate_source_url(&self.source_url, "source_url")?;
        Ok(())
    }
}

#[tracing::instrument(skip(queue, downloader, command), fields(source_url = %command.source_url))]
pub async fn handle(
    queue: &JobQueue,
    downloader: &dyn Downloader,
    max_duration: Duration,
    command: SubmitSeparationCommand,
) -> Result<SubmitJobResponse, SubmitSeparationError> {
    command.validate()?;

    let info = downloader
        .probe(command.source_url.trim())
        .await
        .map_err(|e| match e {
            ToolError::SourceUnavailable(reason) => SubmitSeparationError::SourceUnavailable(reason),
            other => SubmitSeparationError::ProbeFailed(other.to_string()),
        })?;

    let duration = info.duration.ok_or(SubmitSeparationError::DurationUnknown)?;
    if duration > max_duration.as_secs_f64() {
        return Err(SubmitSeparationError::TooLong {
            duration,
            max: max_duration.as_secs(),
        });
    }

    let job_id = queue
        .submit(JobPayload::AudioSeparation {
            source_url: command.source_url.trim().to_string(),
        })
        .await?;

    tracing::info!(%job_id, duration, title = info.title.as_deref().unwrap_or(""), "Separation accepted");

    Ok(SubmitJobResponse {
        job_id,
        kind: JobKind::AudioSeparation,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::jobs::{MemoryJobStore, SystemClock};
    use crate::tools::SourceInfo;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    struct FixedProbe(Result<Option<f64>, &'static str>);

    #[async_trait]
    impl Downloader for FixedProbe {
        async fn probe(&self, _url: &str) -> Result<SourceInfo, ToolError> {
            match self.0 {
                Ok(duration) => Ok(SourceInfo {
                    duration,
                    title: Some("clip".to_string()),
                }),
                Err(reason) => Err(ToolError::SourceUnavailable(reason.to_string())),
            }
        }

        async fn download(&self, _url: &str, _dir: &Path) -> Result<PathBuf, ToolError> {
            unreachable!("submission never downloads")
        }
    }

    fn queue() -> JobQueue {
        JobQueue::new(Arc::new(MemoryJobStore::new()), Arc::new(SystemClock), 3)
    }

    fn command() -> SubmitSeparationCommand {
        SubmitSeparationCommand {
            source_url: "https://www.youtube.com/watch?v=abc".to_string(),
        }
    }

    const LIMIT: Duration = Duration::from_secs(360);

    #[tokio::test]
    async fn test_short_source_accepted() {
        let queue = queue();
        let response = handle(&queue, &FixedProbe(Ok(Some(300.0))), LIMIT, command())
            .await
            .unwrap();
        assert_eq!(response.kind, JobKind::AudioSeparation);
        assert!(queue.job(response.job_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_exact_limit_accepted() {
        let result = handle(&queue(), &FixedProbe(Ok(Some(360.0))), LIMIT, command()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_long_source_rejected() {
        let err = handle(&queue(), &FixedProbe(Ok(Some(400.0))), LIMIT, command())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitSeparationError::TooLong { max: 360, .. }));
        assert_eq!(err.to_string(), "Source is 400s long; the limit is 360s");
    }

    #[tokio::test]
    async fn test_missing_duration_rejected() {
        let err = handle(&queue(), &FixedProbe(Ok(None)), LIMIT, command())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitSeparationError::DurationUnknown));
    }

    #[tokio::test]
    async fn test_unavailable_source_rejected() {
        let err = handle(&queue(), &FixedProbe(Err("Video unavailable")), LIMIT, command())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitSeparationError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_bad_url_never_probes() {
        let err = handle(
            &queue(),
            &FixedProbe(Ok(Some(10.0))),
            LIMIT,
            SubmitSeparationCommand {
                source_url: "javascript:alert(1)".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SubmitSeparationError::InvalidUrl(_)));
    }
}
