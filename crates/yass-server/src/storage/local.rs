use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use super::{
    describe_file, detect_content_type, join_url, ArtifactStore, PublishedArtifact, StorageError,
};

/// Filesystem artifact store: `<root>/<bucket>/<object_name>`
pub struct LocalStorage {
    root: PathBuf,
    public_base: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base: public_base.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, object_name: &str) -> Result<PathBuf, StorageError> {
        for part in [bucket, object_name] {
            if part.is_empty() || part.contains(['/', '\\']) || part == "." || part == ".." {
                return Err(StorageError::Backend(format!(
                    "Invalid bucket or object name: {}",
                    part
                )));
            }
        }
        Ok(self.root.join(bucket).join(object_name))
    }
}

#[async_trait]
impl ArtifactStore for LocalStorage {
    #[instrument(skip(self), fields(path = %local_path.display()))]
    async fn publish(
        &self,
        local_path: &Path,
        bucket: &str,
        object_name: &str,
    ) -> Result<PublishedArtifact, StorageError> {
        let target = self.object_path(bucket, object_name)?;

        tokio::fs::create_dir_all(self.root.join(bucket))
            .await
            .map_err(|e| StorageError::Bucket {
                bucket: bucket.to_string(),
                message: e.to_string(),
            })?;

        let content_type = detect_content_type(local_path).await?;
        let (size, sha256) = describe_file(local_path).await?;

        if let Err(e) = tokio::fs::copy(local_path, &target).await {
            warn!(error = %e, "Copy failed, removing partial object");
            if let Err(cleanup) = self.delete(bucket, object_name).await {
                warn!(error = %cleanup, "Best-effort delete after failed copy also failed");
            }
            return Err(StorageError::Upload {
                bucket: bucket.to_string(),
                object_name: object_name.to_string(),
                message: e.to_string(),
            });
        }

        info!(size, "Published {}/{}", bucket, object_name);

        Ok(PublishedArtifact {
            bucket: bucket.to_string(),
            object_name: object_name.to_string(),
            url: self.public_url(bucket, object_name),
            content_type,
            size,
            sha256,
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, object_name: &str) -> Result<(), StorageError> {
        let target = self.object_path(bucket, object_name)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                info!("Deleted {}/{}", bucket, object_name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{}/{} already absent", bucket, object_name);
                Ok(())
            }
            Err(e) => Err(StorageError::Delete {
                bucket: bucket.to_string(),
                object_name: object_name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn exists(&self, bucket: &str, object_name: &str) -> Result<bool, StorageError> {
        let target = self.object_path(bucket, object_name)?;
        Ok(tokio::fs::try_exists(&target).await?)
    }

    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn fetch(
        &self,
        bucket: &str,
        object_name: &str,
        dest: &Path,
    ) -> Result<u64, StorageError> {
        let source = self.object_path(bucket, object_name)?;
        match tokio::fs::copy(&source, dest).await {
            Ok(size) => {
                debug!(size, "Fetched {}/{}", bucket, object_name);
                Ok(size)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                object_name: object_name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, bucket: &str, object_name: &str) -> String {
        join_url(&self.public_base, bucket, object_name)
    }
}
