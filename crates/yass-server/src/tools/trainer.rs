use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use super::config::ToolsConfig;
use super::process::{run_command, tokio_command};
use super::ToolError;

/// Hyperparameters of a voice-model training run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub model_name: String,
    pub dataset_path: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_total_epochs")]
    pub total_epochs: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_f0_method")]
    pub f0_method: String,
    #[serde(default = "default_hop_length")]
    pub hop_length: u32,
    #[serde(default = "default_save_every_epoch")]
    pub save_every_epoch: u32,
}

fn default_sample_rate() -> u32 {
    40000
}
fn default_total_epochs() -> u32 {
    100
}
fn default_batch_size() -> u32 {
    8
}
fn default_f0_method() -> String {
    "rmvpe".to_string()
}
fn default_hop_length() -> u32 {
    128
}
fn default_save_every_epoch() -> u32 {
    10
}

const SAMPLE_RATES: &[u32] = &[32000, 40000, 48000];
pub(crate) const F0_METHODS: &[&str] = &["pm", "harvest", "dio", "crepe", "crepe-tiny", "rmvpe"];

impl TrainingParams {
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.model_name.is_empty()
            || !self
                .model_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ToolError::InvalidInput(
                "model_name must be non-empty and use only letters, digits, '-' or '_'".to_string(),
            ));
        }
        if self.dataset_path.trim().is_empty() {
            return Err(ToolError::InvalidInput("dataset_path must not be empty".to_string()));
        }
        if !SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(ToolError::InvalidInput(format!(
                "sample_rate must be one of {:?}",
                SAMPLE_RATES
            )));
        }
        if !F0_METHODS.contains(&self.f0_method.as_str()) {
            return Err(ToolError::InvalidInput(format!(
                "f0_method must be one of {:?}",
                F0_METHODS
            )));
        }
        if self.total_epochs == 0 || self.batch_size == 0 || self.hop_length == 0 {
            return Err(ToolError::InvalidInput(
                "total_epochs, batch_size and hop_length must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Files a finished training run leaves behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainedModel {
    pub weights: PathBuf,
    /// Feature index used at conversion time
    pub index: PathBuf,
}

#[async_trait]
pub trait VoiceTrainer: Send + Sync {
    /// Run the full training pipeline inside `workdir`
    async fn train(&self, params: &TrainingParams, workdir: &Path)
        -> Result<TrainedModel, ToolError>;
}

/// Drives the RVC training scripts: preprocess, extract, train, index
pub struct RvcTrainer {
    python: String,
    scripts_dir: PathBuf,
    device: String,
    version: String,
}

impl RvcTrainer {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            python: config.trainer_python.clone(),
            scripts_dir: config.trainer_scripts_dir.clone(),
            device: config.trainer_device.clone(),
            version: config.trainer_version.clone(),
        }
    }

    fn script(&self, relative: &str) -> PathBuf {
        self.scripts_dir.join("train").join(relative)
    }

    async fn step(&self, name: &str, script: PathBuf, args: Vec<String>) -> Result<(), ToolError> {
        info!(step = name, "Training step started");
        let mut cmd = tokio_command(&self.python);
        cmd.arg(script).args(&args);

        let output = run_command(name, &mut cmd, None).await?;
        if !output.status.success() {
            return Err(ToolError::failed(name, output.failure_summary()));
        }
        info!(step = name, elapsed_secs = output.duration.as_secs(), "Training step finished");
        Ok(())
    }
}

/// Prefer `<model>.pth`, otherwise the newest `.pth` in `dir`
async fn find_weights(dir: &Path, model_name: &str) -> Result<Option<PathBuf>, ToolError> {
    let preferred = dir.join(format!("{}.pth", model_name));
    if tokio::fs::try_exists(&preferred).await? {
        return Ok(Some(preferred));
    }

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("pth") {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// The `added_*.index` written by the index step, else any `.index`
async fn find_index(dir: &Path) -> Result<Option<PathBuf>, ToolError> {
    let mut fallback = None;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("index") {
            continue;
        }
        let added = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("added"))
            .unwrap_or(false);
        if added {
            return Ok(Some(path));
        }
        fallback.get_or_insert(path);
    }
    Ok(fallback)
}

#[async_trait]
impl VoiceTrainer for RvcTrainer {
    #[instrument(skip(self, params), fields(model = %params.model_name))]
    async fn train(
        &self,
        params: &TrainingParams,
        workdir: &Path,
    ) -> Result<TrainedModel, ToolError> {
        params.validate()?;

        if !tokio::fs::try_exists(&params.dataset_path).await? {
            return Err(ToolError::InvalidInput(format!(
                "dataset_path does not exist: {}",
                params.dataset_path
            )));
        }

        let model_dir = workdir.join(&params.model_name);
        tokio::fs::create_dir_all(&model_dir).await?;
        let model_path = model_dir.display().to_string();

        self.step(
            "preprocess",
            self.script("preprocess/preprocess.py"),
            vec![
                model_path.clone(),
                params.dataset_path.clone(),
                params.sample_rate.to_string(),
                "3.7".to_string(),
            ],
        )
        .await?;

        self.step(
            "extract_f0",
            self.script("extract/extract_f0_print.py"),
            vec![
                model_path.clone(),
                params.f0_method.clone(),
                params.hop_length.to_string(),
            ],
        )
        .await?;

        self.step(
            "extract_feature",
            self.script("extract/extract_feature_print.py"),
            vec![
                self.device.clone(),
                "1".to_string(),
                "0".to_string(),
                "0".to_string(),
                model_path.clone(),
                self.version.clone(),
                "True".to_string(),
            ],
        )
        .await?;

        self.step(
            "train",
            self.script("train.py"),
            vec![
                "-se".to_string(),
                params.save_every_epoch.to_string(),
                "-te".to_string(),
                params.total_epochs.to_string(),
                "-sr".to_string(),
                params.sample_rate.to_string(),
                "-bs".to_string(),
                params.batch_size.to_string(),
                "-g".to_string(),
                "0".to_string(),
                "-e".to_string(),
                model_path.clone(),
                "-v".to_string(),
                self.version.clone(),
                "-l".to_string(),
                "1".to_string(),
                "-c".to_string(),
                "0".to_string(),
                "-sw".to_string(),
                "1".to_string(),
            ],
        )
        .await?;

        let weights = find_weights(&model_dir, &params.model_name)
            .await?
            .ok_or_else(|| ToolError::failed("train", "no weights file produced"))?;

        self.step(
            "extract_index",
            self.script("process/extract_index.py"),
            vec![model_path, self.version.clone()],
        )
        .await?;

        let index = find_index(&model_dir)
            .await?
            .ok_or_else(|| ToolError::failed("extract_index", "no index file produced"))?;

        Ok(TrainedModel { weights, index })
    }
}
