//! YASS Worker - job processing without the HTTP API
//!
//! Shares the PostgreSQL job store with `yass-server`, so any number of
//! worker processes can be added next to it.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use yass_common::logging::{init_logging, LogConfig, LogLevel};

use yass_server::{
    config::Config,
    jobs::config::JobBackend,
    runtime::{shutdown_signal, Services},
};

#[derive(Parser, Debug)]
#[command(name = "yass-worker")]
#[command(author, version, about = "YASS background job worker")]
struct Cli {
    /// Number of concurrent jobs (overrides JOB_WORKERS)
    #[arg(short, long)]
    workers: Option<usize>,

    /// PostgreSQL URL of the shared job store
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("yass-worker".to_string())
        .filter_directives("sqlx=warn".to_string())
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    let mut config = Config::load()?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if let Some(workers) = cli.workers {
        config.jobs.workers = workers;
    }
    if config.jobs.backend != JobBackend::Postgres {
        warn!("A standalone worker needs the shared store; switching JOB_BACKEND to postgres");
        config.jobs.backend = JobBackend::Postgres;
    }
    if config.jobs.workers == 0 {
        anyhow::bail!("--workers must be greater than 0");
    }

    info!(workers = config.jobs.workers, "Starting YASS worker");

    let services = Services::init(&config).await?;
    let cancel = CancellationToken::new();
    let background = services.spawn_background(&config, config.jobs.workers, cancel.clone());

    shutdown_signal().await;
    cancel.cancel();
    background
        .join(Duration::from_secs(config.server.shutdown_timeout_secs))
        .await;

    info!("Worker shut down gracefully");
    Ok(())
}
