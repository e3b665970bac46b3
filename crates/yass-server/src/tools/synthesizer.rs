use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

use super::config::ToolsConfig;
use super::process::{run_command, tokio_command};
use super::ToolError;

pub const SPEECH_FILE: &str = "tts_output.mp3";

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Render `text` with `voice` into `out_dir` and return the audio file
    async fn synthesize(&self, text: &str, voice: &str, out_dir: &Path)
        -> Result<PathBuf, ToolError>;
}

/// edge-tts, one process per request
pub struct EdgeTtsSynthesizer {
    bin: String,
    timeout: Duration,
}

impl EdgeTtsSynthesizer {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            bin: config.edge_tts_bin.clone(),
            timeout: Duration::from_secs(config.synthesis_timeout_secs),
        }
    }
}

/// Reject input the engine cannot render
pub fn validate_request(text: &str, voice: &str) -> Result<(), ToolError> {
    if text.trim().is_empty() {
        return Err(ToolError::InvalidInput("text must not be empty".to_string()));
    }
    if voice.trim().is_empty() {
        return Err(ToolError::InvalidInput("voice must not be empty".to_string()));
    }
    // Voice names look like `ko-KR-SunHiNeural`.
    if !voice
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ToolError::InvalidInput(format!("invalid voice name: {}", voice)));
    }
    Ok(())
}

/// Command line for one edge-tts run.
///
/// The text is attached to its flag with `=` so input starting with `-`
/// is never read as an option.
pub fn build_args(text: &str, voice: &str, output_path: &Path) -> Vec<OsString> {
    let mut media = OsString::from("--write-media=");
    media.push(output_path.as_os_str());
    vec![
        OsString::from(format!("--text={}", text)),
        OsString::from(format!("--voice={}", voice)),
        media,
    ]
}

#[async_trait]
impl Synthesizer for EdgeTtsSynthesizer {
    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        out_dir: &Path,
    ) -> Result<PathBuf, ToolError> {
        validate_request(text, voice)?;

        let output_path = out_dir.join(SPEECH_FILE);
        let mut cmd = tokio_command(&self.bin);
        cmd.args(build_args(text, voice, &output_path));

        let output = match run_command("edge-tts", &mut cmd, Some(self.timeout)).await {
            Ok(output) => output,
            Err(ToolError::Failed { message, .. }) => return Err(ToolError::SynthesisFailed(message)),
            Err(e) => return Err(e),
        };

        if !output.status.success() {
            return Err(ToolError::SynthesisFailed(output.failure_summary()));
        }

        let size = match tokio::fs::metadata(&output_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        if size == 0 {
            return Err(ToolError::SynthesisFailed(
                "engine produced no audio".to_string(),
            ));
        }

        info!(size, path = %output_path.display(), "Synthesis complete");
        Ok(output_path)
    }
}
