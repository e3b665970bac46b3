use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Which artifact store backs the publish/delete operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" | "minio" => Ok(StorageBackend::S3),
            "local" | "fs" => Ok(StorageBackend::Local),
            other => Err(anyhow::anyhow!("Invalid storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
    /// Base of the URLs handed to clients; objects live at `<base>/<bucket>/<object>`
    pub public_url: Option<String>,
    /// Root directory of the local backend
    pub local_root: PathBuf,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StorageBackend::S3,
        };

        Ok(Self {
            backend,
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            public_url: env::var("STORAGE_PUBLIC_URL").ok(),
            local_root: env::var("STORAGE_LOCAL_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("yass-artifacts")),
        })
    }

    pub fn for_minio(endpoint: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::S3,
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
            public_url: None,
            local_root: env::temp_dir().join("yass-artifacts"),
        }
    }

    pub fn for_local(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackend::Local,
            local_root: root.into(),
            ..Self::default()
        }
    }

    /// Public base URL, falling back to the S3 endpoint or the local root
    pub fn public_base(&self) -> String {
        if let Some(url) = &self.public_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.backend {
            StorageBackend::S3 => self
                .endpoint
                .clone()
                .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region))
                .trim_end_matches('/')
                .to_string(),
            StorageBackend::Local => format!("file://{}", self.local_root.display()),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::for_minio("http://localhost:9000")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_for_minio() {
        let config = StorageConfig::for_minio("http://localhost:9000");
        assert_eq!(config.endpoint, Some("http://localhost:9000".to_string()));
        assert_eq!(config.backend, StorageBackend::S3);
        assert!(config.path_style);
        assert_eq!(config.access_key, "minioadmin");
    }

    #[test]
    fn test_public_base_prefers_explicit_url() {
        let mut config = StorageConfig::for_minio("http://minio:9000/");
        assert_eq!(config.public_base(), "http://minio:9000");

        config.public_url = Some("https://cdn.yass-ai.com/".to_string());
        assert_eq!(config.public_base(), "https://cdn.yass-ai.com");
    }

    #[test]
    fn test_public_base_local() {
        let config = StorageConfig::for_local("/srv/artifacts");
        assert_eq!(config.public_base(), "file:///srv/artifacts");
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("MinIO".parse::<StorageBackend>().unwrap(), StorageBackend::S3);
        assert_eq!("local".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert!("gcs".parse::<StorageBackend>().is_err());
    }
}
