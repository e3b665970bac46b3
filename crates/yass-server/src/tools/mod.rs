//! Adapters around the external media tools
//!
//! The downloader, separator, synthesizer, trainer and converter are opaque
//! programs.
//! Every adapter here runs them off the async executor and reports failures
//! as a [`ToolError`], which the worker maps onto the retry taxonomy.

use thiserror::Error;
use yass_common::types::ErrorKind;

pub mod config;
pub mod converter;
pub mod downloader;
pub mod process;
pub mod separator;
pub mod synthesizer;
pub mod trainer;

pub use converter::{
    ConversionInputs, ConversionParams, RvcConverter, StoredObject, VoiceConverter,
};
pub use downloader::{Downloader, SourceInfo, YtDlpDownloader};
pub use separator::{SeparationModel, Separator, Stems};
pub use synthesizer::{EdgeTtsSynthesizer, Synthesizer};
pub use trainer::{RvcTrainer, TrainedModel, TrainingParams, VoiceTrainer};

#[derive(Debug, Error)]
pub enum ToolError {
    /// The source does not exist, is private or needs a login
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("{tool} failed: {message}")]
    Failed { tool: String, message: String },

    #[error("Separation failed: {0}")]
    SeparationFailed(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    pub fn failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::Failed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::SourceUnavailable(_) | ToolError::Timeout { .. } => {
                ErrorKind::UpstreamUnavailable
            }
            ToolError::InvalidInput(_) => ErrorKind::Validation,
            ToolError::Failed { .. }
            | ToolError::SeparationFailed(_)
            | ToolError::SynthesisFailed(_)
            | ToolError::Io(_) => ErrorKind::ToolFailure,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            ToolError::SourceUnavailable("private".into()).kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(
            ToolError::Timeout {
                tool: "yt-dlp".into(),
                secs: 30
            }
            .kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(
            ToolError::SeparationFailed("no stems".into()).kind(),
            ErrorKind::ToolFailure
        );
        assert_eq!(
            ToolError::InvalidInput("empty text".into()).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = ToolError::Timeout {
            tool: "yt-dlp".into(),
            secs: 30,
        };
        assert_eq!(err.to_string(), "yt-dlp timed out after 30s");
    }
}
