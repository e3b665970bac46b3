//! Artifact storage
//!
//! Job outputs are published to a bucket, handed to clients as a public URL
//! and removed again by a deferred deletion job. [`ArtifactStore`] is the seam
//! between the pipelines and the backend: [`s3::S3Storage`] in production,
//! [`local::LocalStorage`] for development and tests.

use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use uuid::Uuid;
use yass_common::types::ErrorKind;

pub mod config;
pub mod local;
pub mod s3;

use config::{StorageBackend, StorageConfig};

/// Bucket for synthesized speech
pub const TTS_BUCKET: &str = "tts-bucket";
/// Bucket for separated stems
pub const SEPARATION_BUCKET: &str = "separation-bucket";
/// Bucket for trained voice models
pub const TRAINING_BUCKET: &str = "training-bucket";
/// Bucket for converted vocals and their mixes
pub const CONVERSION_BUCKET: &str = "conversion-bucket";

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{object_name}")]
    NotFound { bucket: String, object_name: String },

    #[error("Failed to create bucket {bucket}: {message}")]
    Bucket { bucket: String, message: String },

    #[error("Upload of {bucket}/{object_name} failed: {message}")]
    Upload {
        bucket: String,
        object_name: String,
        message: String,
    },

    #[error("Delete of {bucket}/{object_name} failed: {message}")]
    Delete {
        bucket: String,
        object_name: String,
        message: String,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound { .. } => ErrorKind::ResourceNotFound,
            _ => ErrorKind::StorageFailure,
        }
    }
}

/// What a successful publish produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    pub bucket: String,
    pub object_name: String,
    pub url: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload `local_path` as `bucket/object_name`, creating the bucket when absent.
    ///
    /// A failed upload is followed by a best-effort delete of the object.
    async fn publish(
        &self,
        local_path: &Path,
        bucket: &str,
        object_name: &str,
    ) -> Result<PublishedArtifact, StorageError>;

    /// Remove an object. Removing an absent object is not an error.
    async fn delete(&self, bucket: &str, object_name: &str) -> Result<(), StorageError>;

    async fn exists(&self, bucket: &str, object_name: &str) -> Result<bool, StorageError>;

    /// Download `bucket/object_name` to `dest`, returning its size.
    ///
    /// A missing object is [`StorageError::NotFound`].
    async fn fetch(&self, bucket: &str, object_name: &str, dest: &Path)
        -> Result<u64, StorageError>;

    fn public_url(&self, bucket: &str, object_name: &str) -> String;
}

/// Build the configured backend
pub async fn init(config: &StorageConfig) -> anyhow::Result<Arc<dyn ArtifactStore>> {
    let store: Arc<dyn ArtifactStore> = match config.backend {
        StorageBackend::S3 => Arc::new(s3::S3Storage::new(config.clone()).await?),
        StorageBackend::Local => Arc::new(local::LocalStorage::new(
            config.local_root.clone(),
            config.public_base(),
        )?),
    };
    Ok(store)
}

/// Object name for a system-produced file: `<UTC timestamp>-<token>-<file name>`
pub fn object_name_for(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");

    let clean: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let token = Uuid::new_v4().simple().to_string();

    format!(
        "{}-{}-{}",
        Utc::now().format("%Y%m%dT%H%M%SZ"),
        &token[..12],
        clean
    )
}

/// `<base>/<bucket>/<object>`
pub fn join_url(base: &str, bucket: &str, object_name: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), bucket, object_name)
}

/// Content type from the extension
pub fn content_type_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "m4a" | "mp4" => "audio/mp4",
        "webm" => "audio/webm",
        "json" => "application/json",
        "txt" | "log" => "text/plain",
        "pth" | "index" | "bin" => DEFAULT_CONTENT_TYPE,
        _ => return None,
    };
    Some(content_type)
}

/// Recognise audio containers by their leading bytes
pub fn sniff_audio(head: &[u8]) -> Option<&'static str> {
    if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WAVE" {
        return Some("audio/wav");
    }
    if head.starts_with(b"ID3") {
        return Some("audio/mpeg");
    }
    // MPEG audio frame sync
    if head.len() >= 2 && head[0] == 0xFF && (head[1] & 0xE0) == 0xE0 {
        return Some("audio/mpeg");
    }
    if head.starts_with(b"fLaC") {
        return Some("audio/flac");
    }
    if head.starts_with(b"OggS") {
        return Some("audio/ogg");
    }
    None
}

/// Extension first, then magic bytes, then `application/octet-stream`
pub async fn detect_content_type(path: &Path) -> Result<String, StorageError> {
    if let Some(ct) = content_type_from_extension(path) {
        return Ok(ct.to_string());
    }

    let mut file = tokio::fs::File::open(path).await?;
    let mut head = [0u8; 12];
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(sniff_audio(&head[..filled])
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string())
}

/// Size and SHA-256 of a local file
pub(crate) async fn describe_file(path: &Path) -> Result<(u64, String), StorageError> {
    let size = tokio::fs::metadata(path).await?.len();
    let owned = path.to_path_buf();
    let sha256 = tokio::task::spawn_blocking(move || yass_common::checksum::sha256_file(owned))
        .await
        .map_err(|e| StorageError::Backend(format!("checksum task failed: {}", e)))?
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok((size, sha256))
}
