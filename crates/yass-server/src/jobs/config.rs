use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::env_or;

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 10;
/// Published artifacts are deleted this long after upload.
pub const DEFAULT_ARTIFACT_RETENTION_SECS: u64 = 600;
/// Finished job records are purged this long after they finish.
pub const DEFAULT_RESULT_RETENTION_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 300;
/// A job still running after this long is assumed to have lost its worker.
pub const DEFAULT_STALE_AFTER_SECS: u64 = 60 * 60;
/// How often a busy worker refreshes its claim.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Which [`JobStore`](super::JobStore) implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for JobBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(JobBackend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(JobBackend::Postgres),
            other => Err(anyhow::anyhow!("Invalid job backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub backend: JobBackend,
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_secs: u64,
    pub artifact_retention_secs: u64,
    pub result_retention_secs: u64,
    pub reaper_interval_secs: u64,
    pub stale_after_secs: u64,
    pub heartbeat_interval_secs: u64,
    /// Run workers inside the HTTP server process
    pub embedded_workers: bool,
}

impl JobsConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let backend = match std::env::var("JOB_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.backend,
        };

        Ok(Self {
            backend,
            workers: env_or("JOB_WORKERS", defaults.workers),
            poll_interval_ms: env_or("JOB_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            max_attempts: env_or("JOB_MAX_ATTEMPTS", defaults.max_attempts),
            retry_backoff_secs: env_or("JOB_RETRY_BACKOFF_SECS", defaults.retry_backoff_secs),
            artifact_retention_secs: env_or(
                "ARTIFACT_RETENTION_SECS",
                defaults.artifact_retention_secs,
            ),
            result_retention_secs: env_or(
                "JOB_RESULT_RETENTION_SECS",
                defaults.result_retention_secs,
            ),
            reaper_interval_secs: env_or("JOB_REAPER_INTERVAL_SECS", defaults.reaper_interval_secs),
            stale_after_secs: env_or("JOB_STALE_AFTER_SECS", defaults.stale_after_secs),
            heartbeat_interval_secs: env_or(
                "JOB_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval_secs,
            ),
            embedded_workers: env_or("JOB_EMBEDDED_WORKERS", defaults.embedded_workers),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("JOB_MAX_ATTEMPTS must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("JOB_POLL_INTERVAL_MS must be greater than 0");
        }
        if self.reaper_interval_secs == 0 {
            anyhow::bail!("JOB_REAPER_INTERVAL_SECS must be greater than 0");
        }
        if self.heartbeat_interval_secs == 0 || self.heartbeat_interval_secs >= self.stale_after_secs
        {
            anyhow::bail!(
                "JOB_HEARTBEAT_INTERVAL_SECS must be positive and below JOB_STALE_AFTER_SECS"
            );
        }
        if self.embedded_workers && self.workers == 0 {
            anyhow::bail!("JOB_WORKERS must be greater than 0 when workers are embedded");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn artifact_retention(&self) -> Duration {
        Duration::from_secs(self.artifact_retention_secs)
    }

    pub fn result_retention(&self) -> Duration {
        Duration::from_secs(self.result_retention_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            backend: JobBackend::Memory,
            workers: DEFAULT_WORKERS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_secs: DEFAULT_RETRY_BACKOFF_SECS,
            artifact_retention_secs: DEFAULT_ARTIFACT_RETENTION_SECS,
            result_retention_secs: DEFAULT_RESULT_RETENTION_SECS,
            reaper_interval_secs: DEFAULT_REAPER_INTERVAL_SECS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            embedded_workers: true,
        }
    }
}
