//! Common test utilities for YASS server integration tests
//!
//! Provides a fully wired job system backed by the in-memory store, a local
//! artifact store in a temporary directory, and fake tools that write small
//! files instead of shelling out.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestHarness;
//!
//! #[tokio::test]
//! async fn test_pipeline() {
//!     let harness = TestHarness::new();
//!     let job_id = harness.queue.submit(payload).await.unwrap();
//!     harness.drain().await;
//! }
//! ```

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use yass_server::jobs::{
    Clock, JobQueue, MemoryJobStore, PipelineExecutor, PipelineTools, RetryPolicy, WorkerPool,
};
use yass_server::storage::{local::LocalStorage, ArtifactStore};
use yass_server::tools::{
    converter::{CONVERTED_FILE, MIX_FILE},
    downloader::DOWNLOAD_STEM,
    separator::{ACCOMPANIMENT_FILE, VOCALS_FILE},
    ConversionInputs, ConversionParams, Downloader, SeparationModel, Separator, SourceInfo,
    Synthesizer, ToolError, TrainedModel, TrainingParams, VoiceConverter, VoiceTrainer,
};
use yass_server::workspace::{WorkspaceConfig, WorkspaceManager};

pub const ARTIFACT_RETENTION: Duration = Duration::from_secs(600);

/// Minimal RIFF/WAVE header followed by silence
pub fn wav_bytes(len: usize) -> Vec<u8> {
    let mut data = b"RIFF\0\0\0\0WAVEfmt ".to_vec();
    data.resize(len.max(data.len()), 0);
    data
}

// ============================================================================
// Clock
// ============================================================================

/// A clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ============================================================================
// Fake tools
// ============================================================================

/// Writes `input.mp3`; fails with `SourceUnavailable` for URLs containing "private"
#[derive(Default)]
pub struct FakeDownloader {
    pub downloads: AtomicUsize,
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn probe(&self, url: &str) -> Result<SourceInfo, ToolError> {
        if url.contains("private") {
            return Err(ToolError::SourceUnavailable("Private video".to_string()));
        }
        Ok(SourceInfo {
            duration: Some(120.0),
            title: Some("fixture".to_string()),
        })
    }

    async fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, ToolError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if url.contains("private") {
            return Err(ToolError::SourceUnavailable("Private video".to_string()));
        }
        let path = dir.join(format!("{}.mp3", DOWNLOAD_STEM));
        tokio::fs::write(&path, b"ID3\x04\0\0fake mp3").await?;
        Ok(path)
    }
}

/// Writes both stems next to the input's name
pub struct FakeSeparationModel {
    pub stem_size: usize,
}

impl SeparationModel for FakeSeparationModel {
    fn separate(&mut self, input: &Path, out_dir: &Path) -> Result<(), ToolError> {
        let name = input.file_stem().and_then(|s| s.to_str()).unwrap_or("input");
        let dir = out_dir.join(name);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(VOCALS_FILE), wav_bytes(self.stem_size))?;
        std::fs::write(dir.join(ACCOMPANIMENT_FILE), wav_bytes(self.stem_size))?;
        Ok(())
    }
}

pub struct FakeSynthesizer;

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &str,
        out_dir: &Path,
    ) -> Result<PathBuf, ToolError> {
        let path = out_dir.join("tts_output.mp3");
        let mut body = b"ID3\x04\0\0".to_vec();
        body.extend_from_slice(text.as_bytes());
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}

/// Writes `<model>.pth` (256 bytes) and `added_<model>.index` (64 bytes)
pub struct FakeTrainer;

#[async_trait]
impl VoiceTrainer for FakeTrainer {
    async fn train(
        &self,
        params: &TrainingParams,
        workdir: &Path,
    ) -> Result<TrainedModel, ToolError> {
        let weights = workdir.join(format!("{}.pth", params.model_name));
        tokio::fs::write(&weights, vec![1u8; 256]).await?;
        let index = workdir.join(format!("added_{}.index", params.model_name));
        tokio::fs::write(&index, vec![2u8; 64]).await?;
        Ok(TrainedModel { weights, index })
    }
}

/// Copies the vocals as the converted track; the mix is both inputs back to back.
/// Remembers the inputs of the last conversion.
#[derive(Default)]
pub struct FakeConverter {
    pub last_inputs: Mutex<Option<ConversionInputs>>,
}

#[async_trait]
impl VoiceConverter for FakeConverter {
    async fn convert(
        &self,
        _params: &ConversionParams,
        inputs: &ConversionInputs,
        out_dir: &Path,
    ) -> Result<PathBuf, ToolError> {
        for input in [Some(&inputs.vocals), Some(&inputs.model), inputs.index.as_ref()]
            .into_iter()
            .flatten()
        {
            if !input.exists() {
                return Err(ToolError::failed("infer", "input missing"));
            }
        }
        *self.last_inputs.lock() = Some(inputs.clone());
        let path = out_dir.join(CONVERTED_FILE);
        tokio::fs::copy(&inputs.vocals, &path).await?;
        Ok(path)
    }

    async fn mix(
        &self,
        vocals: &Path,
        accompaniment: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf, ToolError> {
        let mut body = tokio::fs::read(vocals).await?;
        body.extend(tokio::fs::read(accompaniment).await?);
        let path = out_dir.join(MIX_FILE);
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestHarness {
    pub queue: JobQueue,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<LocalStorage>,
    pub workspaces: WorkspaceManager,
    pub downloader: Arc<FakeDownloader>,
    pub converter: Arc<FakeConverter>,
    pub pool: WorkerPool,
    _dirs: (tempfile::TempDir, tempfile::TempDir),
}

impl TestHarness {
    pub fn new() -> Self {
        let storage_dir = tempfile::tempdir().unwrap();
        let workspace_dir = tempfile::tempdir().unwrap();

        let clock = Arc::new(ManualClock::new());
        let queue = JobQueue::new(Arc::new(MemoryJobStore::new()), clock.clone(), 3);
        let storage = Arc::new(
            LocalStorage::new(storage_dir.path(), "http://files.test").unwrap(),
        );
        let workspaces = WorkspaceManager::new(&WorkspaceConfig {
            root: workspace_dir.path().to_path_buf(),
            ..WorkspaceConfig::default()
        })
        .unwrap();
        let downloader = Arc::new(FakeDownloader::default());
        let converter = Arc::new(FakeConverter::default());

        let tools = PipelineTools {
            downloader: downloader.clone(),
            separator: Separator::new(Arc::new(
                || -> Result<Box<dyn SeparationModel>, ToolError> {
                    Ok(Box::new(FakeSeparationModel {
                        stem_size: 3 * 1024 * 1024 + 100,
                    }))
                },
            )),
            synthesizer: Arc::new(FakeSynthesizer),
            trainer: Arc::new(FakeTrainer),
            converter: converter.clone(),
        };

        let executor = PipelineExecutor::new(
            queue.clone(),
            storage.clone() as Arc<dyn ArtifactStore>,
            workspaces.clone(),
            tools,
            ARTIFACT_RETENTION,
        );

        let pool = WorkerPool::new(
            queue.clone(),
            Arc::new(executor),
            RetryPolicy::default(),
            1,
            Duration::from_millis(50),
        );

        Self {
            queue,
            clock,
            storage,
            workspaces,
            downloader,
            converter,
            pool,
            _dirs: (storage_dir, workspace_dir),
        }
    }

    /// Run every job that is due right now
    pub async fn drain(&self) -> usize {
        let mut ran = 0;
        while self.pool.run_once().await.unwrap() {
            ran += 1;
        }
        ran
    }

    pub fn object_path(&self, bucket: &str, object_name: &str) -> PathBuf {
        self.storage.root().join(bucket).join(object_name)
    }
}
