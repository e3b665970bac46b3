//! Job bodies
//!
//! Every media pipeline runs inside its own workspace and ends by publishing
//! its outputs, each followed by a deferred deletion job.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use yass_common::types::{ArtifactRef, JobOutput, StreamLink};

use super::clock::to_chrono;
use super::queue::JobQueue;
use super::types::{JobPayload, JobRecord};
use super::worker::{JobError, JobHandler};
use crate::storage::{
    object_name_for, ArtifactStore, CONVERSION_BUCKET, SEPARATION_BUCKET, TRAINING_BUCKET,
    TTS_BUCKET,
};
use crate::tools::{
    ConversionInputs, ConversionParams, Downloader, Separator, StoredObject, Synthesizer,
    TrainingParams, VoiceConverter, VoiceTrainer,
};
use crate::workspace::WorkspaceManager;

/// Path of the streaming endpoint for one stem of a kept workspace
pub fn stream_path(kind: &str, workspace_id: &str, name: &str) -> String {
    format!("/stream/{}/{}/{}", kind, workspace_id, name)
}

/// The collaborators a pipeline needs
#[derive(Clone)]
pub struct PipelineTools {
    pub downloader: Arc<dyn Downloader>,
    pub separator: Separator,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub trainer: Arc<dyn VoiceTrainer>,
    pub converter: Arc<dyn VoiceConverter>,
}

pub struct PipelineExecutor {
    queue: JobQueue,
    storage: Arc<dyn ArtifactStore>,
    workspaces: WorkspaceManager,
    tools: PipelineTools,
    artifact_retention: Duration,
}

impl PipelineExecutor {
    pub fn new(
        queue: JobQueue,
        storage: Arc<dyn ArtifactStore>,
        workspaces: WorkspaceManager,
        tools: PipelineTools,
        artifact_retention: Duration,
    ) -> Self {
        Self {
            queue,
            storage,
            workspaces,
            tools,
            artifact_retention,
        }
    }

    /// Upload one file and queue its deletion
    #[instrument(skip(self, path), fields(file = %path.display()))]
    async fn publish(&self, path: &Path, bucket: &str, role: &str) -> Result<ArtifactRef, JobError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact");
        let object_name = object_name_for(file_name);

        let published = self.storage.publish(path, bucket, &object_name).await?;

        if let Err(e) = self
            .queue
            .schedule_deletion(bucket, &object_name, self.artifact_retention)
            .await
        {
            // An unscheduled object would never expire.
            warn!(error = %e, "Could not schedule deletion, removing artifact now");
            if let Err(cleanup) = self.storage.delete(bucket, &object_name).await {
                warn!(error = %cleanup, "Immediate delete failed too");
            }
            return Err(e.into());
        }

        Ok(ArtifactRef {
            role: role.to_string(),
            bucket: published.bucket,
            object_name: published.object_name,
            url: published.url,
            content_type: published.content_type,
            size: published.size,
            sha256: published.sha256,
            expires_at: self.queue.clock().now() + to_chrono(self.artifact_retention),
        })
    }

    async fn synthesize_speech(&self, text: &str, voice: &str) -> Result<JobOutput, JobError> {
        let workspace = self.workspaces.acquire_guarded().await?;

        let speech = self
            .tools
            .synthesizer
            .synthesize(text, voice, workspace.path())
            .await?;
        let artifact = self.publish(&speech, TTS_BUCKET, "speech").await?;

        Ok(JobOutput {
            artifacts: vec![artifact],
            streams: Vec::new(),
        })
    }

    async fn separate_audio(&self, source_url: &str) -> Result<JobOutput, JobError> {
        let workspace = self.workspaces.acquire_guarded().await?;

        let input = self
            .tools
            .downloader
            .download(source_url, workspace.path())
            .await?;
        let stems = self.tools.separator.separate(&input, workspace.path()).await?;

        let vocals = self.publish(&stems.vocals, SEPARATION_BUCKET, "vocals").await?;
        let accompaniment = self
            .publish(&stems.accompaniment, SEPARATION_BUCKET, "accompaniment")
            .await?;

        // The stream endpoint or the sweeper releases it from here on.
        let kept = workspace.keep();
        info!(workspace = %kept.id(), "Workspace kept for streaming");

        Ok(JobOutput {
            artifacts: vec![vocals, accompaniment],
            streams: vec![
                StreamLink {
                    role: "vocals".to_string(),
                    path: stream_path("vocal", kept.id(), &stems.name),
                },
                StreamLink {
                    role: "accompaniment".to_string(),
                    path: stream_path("accompaniment", kept.id(), &stems.name),
                },
            ],
        })
    }

    async fn train_voice(&self, params: &TrainingParams) -> Result<JobOutput, JobError> {
        let workspace = self.workspaces.acquire_guarded().await?;

        let trained = self.tools.trainer.train(params, workspace.path()).await?;
        let model = self.publish(&trained.weights, TRAINING_BUCKET, "model").await?;
        let index = self.publish(&trained.index, TRAINING_BUCKET, "index").await?;

        Ok(JobOutput {
            artifacts: vec![model, index],
            streams: Vec::new(),
        })
    }

    /// Copy one input object into the workspace as `<name>.<ext>`
    async fn fetch_input(
        &self,
        object: &StoredObject,
        dir: &Path,
        name: &str,
    ) -> Result<PathBuf, JobError> {
        let file_name = match object.extension() {
            Some(ext) => format!("{}.{}", name, ext),
            None => name.to_string(),
        };
        let path = dir.join(file_name);
        self.storage
            .fetch(&object.bucket, &object.object_name, &path)
            .await?;
        Ok(path)
    }

    async fn convert_voice(&self, params: &ConversionParams) -> Result<JobOutput, JobError> {
        params.validate()?;
        let workspace = self.workspaces.acquire_guarded().await?;
        let dir = workspace.path();

        let inputs = ConversionInputs {
            vocals: self.fetch_input(&params.vocals, dir, "input_vocals").await?,
            model: self.fetch_input(&params.model, dir, "model").await?,
            index: match &params.index {
                Some(index) => Some(self.fetch_input(index, dir, "model").await?),
                None => None,
            },
        };

        let converted = self.tools.converter.convert(params, &inputs, dir).await?;
        let mut artifacts = vec![self.publish(&converted, CONVERSION_BUCKET, "vocals").await?];

        if let Some(accompaniment) = &params.accompaniment {
            let accompaniment = self
                .fetch_input(accompaniment, dir, "input_accompaniment")
                .await?;
            let mixed = self
                .tools
                .converter
                .mix(&converted, &accompaniment, dir)
                .await?;
            artifacts.push(self.publish(&mixed, CONVERSION_BUCKET, "mix").await?);
        }

        Ok(JobOutput {
            artifacts,
            streams: Vec::new(),
        })
    }

    /// Best-effort: failures are logged and the job still succeeds
    async fn delete_artifact(&self, bucket: &str, object_name: &str) -> JobOutput {
        match self.storage.delete(bucket, object_name).await {
            Ok(()) => info!(bucket, object_name, "Expired artifact deleted"),
            Err(e) => warn!(bucket, object_name, error = %e, "Expired artifact could not be deleted"),
        }
        JobOutput::default()
    }
}

#[async_trait]
impl JobHandler for PipelineExecutor {
    async fn handle(&self, job: &JobRecord) -> Result<JobOutput, JobError> {
        match &job.payload {
            JobPayload::SpeechSynthesis { text, voice } => self.synthesize_speech(text, voice).await,
            JobPayload::AudioSeparation { source_url } => self.separate_audio(source_url).await,
            JobPayload::VoiceTraining(params) => self.train_voice(params).await,
            JobPayload::VoiceConversion(params) => self.convert_voice(params).await,
            JobPayload::ArtifactDeletion {
                bucket,
                object_name,
            } => Ok(self.delete_artifact(bucket, object_name).await),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_path() {
        assert_eq!(
            stream_path("vocal", "ws-abc", "input"),
            "/stream/vocal/ws-abc/input"
        );
    }
}
