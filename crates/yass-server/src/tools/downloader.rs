use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::config::ToolsConfig;
use super::process::{run_command, tokio_command};
use super::ToolError;

const TOOL: &str = "yt-dlp";

/// Base name of the downloaded file; the separator names its output directory after it.
pub const DOWNLOAD_STEM: &str = "input";

/// What a probe learned about a source without downloading it
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceInfo {
    /// Seconds; absent for live streams and some extractors
    pub duration: Option<f64>,
    pub title: Option<String>,
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn probe(&self, url: &str) -> Result<SourceInfo, ToolError>;

    /// Fetch the audio track of `url` into `dir` and return the file path
    async fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, ToolError>;
}

pub struct YtDlpDownloader {
    bin: String,
    extra_args: Vec<String>,
    download_timeout: Duration,
    probe_timeout: Duration,
}

impl YtDlpDownloader {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            bin: config.ytdlp_bin.clone(),
            extra_args: config.ytdlp_extra_args.clone(),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
        }
    }

    fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio_command(&self.bin);
        cmd.args(&self.extra_args);
        cmd
    }
}

/// Tell a missing or restricted source apart from a tool failure
pub fn classify_failure(stderr: &str) -> ToolError {
    const UNAVAILABLE: &[&str] = &[
        "http error 404",
        "video unavailable",
        "private video",
        "sign in",
        "login required",
        "this video is not available",
        "does not exist",
        "has been removed",
    ];

    let lower = stderr.to_lowercase();
    let summary = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no output")
        .to_string();

    if UNAVAILABLE.iter().any(|needle| lower.contains(needle)) {
        ToolError::SourceUnavailable(summary)
    } else {
        ToolError::failed(TOOL, summary)
    }
}

/// Remove files left by an earlier attempt in `dir`
async fn clear_partial_downloads(dir: &Path) -> Result<(), ToolError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&format!("{}.", DOWNLOAD_STEM)) && entry.file_type().await?.is_file() {
            debug!(file = %name, "Removing partial download");
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

async fn find_download(dir: &Path) -> Result<Option<PathBuf>, ToolError> {
    let candidate = dir.join(format!("{}.mp3", DOWNLOAD_STEM));
    if tokio::fs::try_exists(&candidate).await? {
        return Ok(Some(candidate));
    }
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("mp3") {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    #[instrument(skip(self))]
    async fn probe(&self, url: &str) -> Result<SourceInfo, ToolError> {
        let mut cmd = self.command();
        cmd.args(["--skip-download", "--dump-json", "--no-playlist", "--no-warnings"])
            .arg(url);

        let output = run_command(TOOL, &mut cmd, Some(self.probe_timeout)).await?;
        if !output.status.success() {
            return Err(classify_failure(&output.stderr));
        }

        let first = output.stdout.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        let info: SourceInfo = serde_json::from_str(first)
            .map_err(|e| ToolError::failed(TOOL, format!("unreadable probe output: {}", e)))?;

        debug!(duration = ?info.duration, title = ?info.title, "Probed source");
        Ok(info)
    }

    #[instrument(skip(self), fields(dir = %dir.display()))]
    async fn download(&self, url: &str, dir: &Path) -> Result<PathBuf, ToolError> {
        clear_partial_downloads(dir).await?;

        let template = dir.join(format!("{}.%(ext)s", DOWNLOAD_STEM));
        let mut cmd = self.command();
        cmd.args(["-x", "--audio-format", "mp3", "--no-playlist", "-o"])
            .arg(&template)
            .arg(url);

        let output = run_command(TOOL, &mut cmd, Some(self.download_timeout)).await?;
        if !output.status.success() {
            return Err(classify_failure(&output.stderr));
        }

        let path = find_download(dir)
            .await?
            .ok_or_else(|| ToolError::failed(TOOL, "no mp3 file produced"))?;

        info!(path = %path.display(), "Download complete");
        Ok(path)
    }
}
