use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use super::config::StorageConfig;
use super::{
    describe_file, detect_content_type, join_url, ArtifactStore, PublishedArtifact, StorageError,
};

/// S3-compatible artifact store (MinIO or AWS)
pub struct S3Storage {
    client: Client,
    public_base: String,
    /// Buckets already confirmed or created by this process
    known_buckets: Mutex<HashSet<String>>,
}

impl S3Storage {
    pub async fn new(config: StorageConfig) -> anyhow::Result<Self> {
        debug!(
            endpoint = ?config.endpoint,
            region = %config.region,
            path_style = config.path_style,
            "Initializing S3 storage"
        );

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "yass-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());
        let public_base = config.public_base();

        info!(%public_base, "S3 storage client initialized");

        Ok(Self {
            client,
            public_base,
            known_buckets: Mutex::new(HashSet::new()),
        })
    }

    #[instrument(skip(self))]
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        if self.known_buckets.lock().contains(bucket) {
            return Ok(());
        }

        if self
            .client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .is_err()
        {
            info!(bucket, "Creating bucket");
            if let Err(e) = self.client.create_bucket().bucket(bucket).send().await {
                // Another worker may have created it between the two calls.
                let raced = e
                    .as_service_error()
                    .map(|se| {
                        se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists()
                    })
                    .unwrap_or(false);
                if !raced {
                    return Err(StorageError::Bucket {
                        bucket: bucket.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        self.known_buckets.lock().insert(bucket.to_string());
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for S3Storage {
    #[instrument(skip(self), fields(path = %local_path.display()))]
    async fn publish(
        &self,
        local_path: &Path,
        bucket: &str,
        object_name: &str,
    ) -> Result<PublishedArtifact, StorageError> {
        self.ensure_bucket(bucket).await?;

        let content_type = detect_content_type(local_path).await?;
        let (size, sha256) = describe_file(local_path).await?;

        debug!(size, %content_type, "Uploading to s3://{}/{}", bucket, object_name);

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::Upload {
                bucket: bucket.to_string(),
                object_name: object_name.to_string(),
                message: e.to_string(),
            })?;

        let upload = self
            .client
            .put_object()
            .bucket(bucket)
            .key(object_name)
            .content_type(&content_type)
            .body(body)
            .send()
            .await;

        if let Err(e) = upload {
            warn!(error = %e, "Upload failed, removing partial object");
            if let Err(cleanup) = self.delete(bucket, object_name).await {
                warn!(error = %cleanup, "Best-effort delete after failed upload also failed");
            }
            return Err(StorageError::Upload {
                bucket: bucket.to_string(),
                object_name: object_name.to_string(),
                message: e.to_string(),
            });
        }

        info!("Successfully uploaded to s3://{}/{}", bucket, object_name);

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
        debug!("Deleting s3://{}/{}", bucket, object_name);

        self.client
            .delete_object()
            .bucket(bucket)
            .key(object_name)
            .send()
            .await
            .map_err(|e| StorageError::Delete {
                bucket: bucket.to_string(),
                object_name: object_name.to_string(),
                message: e.to_string(),
            })?;

        info!("Successfully deleted s3://{}/{}", bucket, object_name);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn exists(&self, bucket: &str, object_name: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(object_name)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if not_found {
                    Ok(false)
                } else {
                    Err(StorageError::Backend(format!(
                        "Failed to check S3 object existence: {}",
                        e
                    )))
                }
            }
        }
    }

    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn fetch(
        &self,
        bucket: &str,
        object_name: &str,
        dest: &Path,
    ) -> Result<u64, StorageError> {
        debug!("Downloading s3://{}/{}", bucket, object_name);

        let response = match self
            .client
            .get_object()
            .bucket(bucket)
            .key(object_name)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                return Err(if missing {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        object_name: object_name.to_string(),
                    }
                } else {
                    StorageError::Backend(format!("Failed to download from S3: {}", e))
                });
            }
        };

        let mut reader = response.body.into_async_read();
        let mut file = tokio::fs::File::create(dest).await?;
        let size = tokio::io::copy(&mut reader, &mut file).await?;

        debug!(size, "Downloaded s3://{}/{}", bucket, object_name);
        Ok(size)
    }

    fn public_url(&self, bucket: &str, object_name: &str) -> String {
        join_url(&self.public_base, bucket, object_name)
    }
}
