//! Configuration management
//!
//! Every section reads its own environment variables with a documented
//! default; [`Config::load`] stitches them together after loading `.env`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::jobs::config::{JobBackend, JobsConfig};
use crate::storage::config::StorageConfig;
use crate::tools::config::ToolsConfig;
use crate::workspace::WorkspaceConfig;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/yass";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// The original deployment allowed any origin.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "*";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub jobs: JobsConfig,
    pub workspace: WorkspaceConfig,
    pub tools: ToolsConfig,
    pub storage: StorageConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration, used when the job backend is PostgreSQL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Read `key` and parse it, falling back to `default` when unset or malformed.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Read `key` as a string, falling back to `default`.
pub(crate) fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_string("YASS_HOST", DEFAULT_SERVER_HOST),
            port: env_or("YASS_PORT", DEFAULT_SERVER_PORT),
            shutdown_timeout_secs: env_or("YASS_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
            connect_timeout_secs: env_or(
                "DATABASE_CONNECT_TIMEOUT",
                DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            ),
        }
    }
}

impl CorsConfig {
    pub fn from_env() -> Self {
        Self {
            allowed_origins: env_string("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ALLOWED_ORIGIN)
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", false),
        }
    }
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            cors: CorsConfig::from_env(),
            jobs: JobsConfig::from_env()?,
            workspace: WorkspaceConfig::from_env(),
            tools: ToolsConfig::from_env(),
            storage: StorageConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.jobs.backend == JobBackend::Postgres {
            if self.database.url.is_empty() {
                anyhow::bail!("DATABASE_URL is required when JOB_BACKEND=postgres");
            }
            if self.database.max_connections == 0 {
                anyhow::bail!("Database max_connections must be greater than 0");
            }
        }

        self.jobs.validate()?;
        self.workspace.validate()?;
        self.tools.validate()?;

        // Credentials on a wildcard origin are rejected by tower-http at runtime.
        if self.cors.allow_credentials && self.cors.allowed_origins.iter().any(|o| o == "*") {
            anyhow::bail!("CORS_ALLOW_CREDENTIALS cannot be combined with a wildcard origin");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: false,
            },
            jobs: JobsConfig::default(),
            workspace: WorkspaceConfig::default(),
            tools: ToolsConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}
