//! YASS Server - Main entry point

use anyhow::Result;
use std::{net::SocketAddr, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::info;
use yass_common::logging::{init_logging, LogConfig};

use yass_server::{
    api,
    config::Config,
    runtime::{shutdown_signal, Services},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("yass-server".to_string())
        .filter_directives("yass_server=debug,tower_http=debug,sqlx=info".to_string())
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting YASS Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let services = Services::init(&config).await?;

    let cancel = CancellationToken::new();
    let workers = if config.jobs.embedded_workers {
        config.jobs.workers
    } else {
        info!("Embedded workers disabled; run yass-worker to process jobs");
        0
    };
    let background = services.spawn_background(&config, workers, cancel.clone());

    let app = api::create_router(services.feature_state(&config), &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, waiting for background tasks");
    cancel.cancel();
    background
        .join(Duration::from_secs(config.server.shutdown_timeout_secs))
        .await;

    info!("Server shut down gracefully");

    Ok(())
}
