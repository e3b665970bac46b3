use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::{env_or, env_string};

/// yt-dlp gives up after this many seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Longest accepted source, in seconds.
pub const DEFAULT_MAX_SOURCE_DURATION_SECS: u64 = 360;

pub const DEFAULT_SYNTHESIS_TIMEOUT_SECS: u64 = 120;

/// RVC inference and the ffmpeg mix each get this long.
pub const DEFAULT_CONVERSION_TIMEOUT_SECS: u64 = 30 * 60;

pub const DEFAULT_SPLEETER_MODEL: &str = "spleeter:2stems";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub ytdlp_bin: String,
    /// Extra arguments placed before every yt-dlp invocation, e.g. cookie options
    pub ytdlp_extra_args: Vec<String>,
    pub download_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub max_source_duration_secs: u64,
    pub spleeter_bin: String,
    pub spleeter_model: String,
    pub edge_tts_bin: String,
    pub synthesis_timeout_secs: u64,
    pub trainer_python: String,
    pub trainer_scripts_dir: PathBuf,
    pub trainer_device: String,
    pub trainer_version: String,
    pub ffmpeg_bin: String,
    pub conversion_timeout_secs: u64,
}

impl ToolsConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ytdlp_bin: env_string("YTDLP_BIN", &defaults.ytdlp_bin),
            ytdlp_extra_args: std::env::var("YTDLP_EXTRA_ARGS")
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            download_timeout_secs: env_or("DOWNLOAD_TIMEOUT_SECS", defaults.download_timeout_secs),
            probe_timeout_secs: env_or("PROBE_TIMEOUT_SECS", defaults.probe_timeout_secs),
            max_source_duration_secs: env_or(
                "MAX_SOURCE_DURATION_SECS",
                defaults.max_source_duration_secs,
            ),
            spleeter_bin: env_string("SPLEETER_BIN", &defaults.spleeter_bin),
            spleeter_model: env_string("SPLEETER_MODEL", &defaults.spleeter_model),
            edge_tts_bin: env_string("EDGE_TTS_BIN", &defaults.edge_tts_bin),
            synthesis_timeout_secs: env_or(
                "SYNTHESIS_TIMEOUT_SECS",
                defaults.synthesis_timeout_secs,
            ),
            trainer_python: env_string("TRAINER_PYTHON", &defaults.trainer_python),
            trainer_scripts_dir: std::env::var("TRAINER_SCRIPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.trainer_scripts_dir),
            trainer_device: env_string("TRAINER_DEVICE", &defaults.trainer_device),
            trainer_version: env_string("TRAINER_VERSION", &defaults.trainer_version),
            ffmpeg_bin: env_string("FFMPEG_BIN", &defaults.ffmpeg_bin),
            conversion_timeout_secs: env_or(
                "CONVERSION_TIMEOUT_SECS",
                defaults.conversion_timeout_secs,
            ),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.download_timeout_secs == 0 {
            anyhow::bail!("DOWNLOAD_TIMEOUT_SECS must be greater than 0");
        }
        if self.max_source_duration_secs == 0 {
            anyhow::bail!("MAX_SOURCE_DURATION_SECS must be greater than 0");
        }
        if self.conversion_timeout_secs == 0 {
            anyhow::bail!("CONVERSION_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_bin: "yt-dlp".to_string(),
            ytdlp_extra_args: Vec::new(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            max_source_duration_secs: DEFAULT_MAX_SOURCE_DURATION_SECS,
            spleeter_bin: "spleeter".to_string(),
            spleeter_model: DEFAULT_SPLEETER_MODEL.to_string(),
            edge_tts_bin: "edge-tts".to_string(),
            synthesis_timeout_secs: DEFAULT_SYNTHESIS_TIMEOUT_SECS,
            trainer_python: "python".to_string(),
            trainer_scripts_dir: PathBuf::from("rvc"),
            trainer_device: "cuda:0".to_string(),
            trainer_version: "v2".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            conversion_timeout_secs: DEFAULT_CONVERSION_TIMEOUT_SECS,
        }
    }
}
