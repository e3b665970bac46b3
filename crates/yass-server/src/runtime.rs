//! Process wiring shared by the server and worker binaries

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::features::FeatureState;
use crate::jobs::{
    self, JobQueue, PipelineExecutor, PipelineTools, Reaper, ReaperConfig, RetryPolicy,
    SystemClock, WorkerPool, WorkerPoolHandle,
};
use crate::storage::{self, ArtifactStore};
use crate::tools::{EdgeTtsSynthesizer, RvcConverter, RvcTrainer, Separator, YtDlpDownloader};
use crate::workspace::WorkspaceManager;

impl PipelineTools {
    /// The command-line tools named in the configuration
    pub fn from_config(config: &crate::tools::config::ToolsConfig) -> Self {
        Self {
            downloader: Arc::new(YtDlpDownloader::new(config)),
            separator: Separator::spleeter(config),
            synthesizer: Arc::new(EdgeTtsSynthesizer::new(config)),
            trainer: Arc::new(RvcTrainer::new(config)),
            converter: Arc::new(RvcConverter::new(config)),
        }
    }
}

/// Long-lived components of one process
#[derive(Clone)]
pub struct Services {
    pub queue: JobQueue,
    pub storage: Arc<dyn ArtifactStore>,
    pub workspaces: WorkspaceManager,
    pub tools: PipelineTools,
}

impl Services {
    pub async fn init(config: &Config) -> anyhow::Result<Self> {
        let store = jobs::init_store(&config.jobs, &config.database).await?;
        info!(backend = ?config.jobs.backend, "Job store ready");

        let queue = JobQueue::new(store, Arc::new(SystemClock), config.jobs.max_attempts);

        let storage = storage::init(&config.storage).await?;
        info!(backend = ?config.storage.backend, "Artifact store ready");

        let workspaces = WorkspaceManager::new(&config.workspace)?;
        workspaces.recover().await?;

        Ok(Self {
            queue,
            storage,
            workspaces,
            tools: PipelineTools::from_config(&config.tools),
        })
    }

    pub fn feature_state(&self, config: &Config) -> FeatureState {
        FeatureState {
            queue: self.queue.clone(),
            workspaces: self.workspaces.clone(),
            downloader: self.tools.downloader.clone(),
            max_source_duration: Duration::from_secs(config.tools.max_source_duration_secs),
        }
    }

    pub fn executor(&self, config: &Config) -> PipelineExecutor {
        PipelineExecutor::new(
            self.queue.clone(),
            self.storage.clone(),
            self.workspaces.clone(),
            self.tools.clone(),
            config.jobs.artifact_retention(),
        )
    }

    /// Start the sweeper and reaper, plus `workers` job workers when nonzero
    pub fn spawn_background(
        &self,
        config: &Config,
        workers: usize,
        cancel: CancellationToken,
    ) -> Background {
        let sweeper = self.workspaces.spawn_sweeper(
            Duration::from_secs(config.workspace.sweep_interval_secs),
            cancel.clone(),
        );

        let reaper = Reaper::new(
            self.queue.clone(),
            ReaperConfig::from_jobs_config(&config.jobs),
        )
        .spawn(cancel.clone());

        let pool = (workers > 0).then(|| {
            WorkerPool::new(
                self.queue.clone(),
                Arc::new(self.executor(config)),
                RetryPolicy::from_jobs_config(&config.jobs),
                workers,
                config.jobs.poll_interval(),
            )
            .with_heartbeat_interval(config.jobs.heartbeat_interval())
            .spawn(cancel.clone())
        });

        Background {
            pool,
            tasks: vec![sweeper, reaper],
        }
    }
}

/// Handles of the background tasks
pub struct Background {
    pool: Option<WorkerPoolHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Background {
    /// Wait for everything to stop, giving in-flight jobs up to `timeout`
    pub async fn join(self, timeout: Duration) {
        let all = async {
            if let Some(pool) = self.pool {
                pool.join().await;
            }
            for result in futures::future::join_all(self.tasks).await {
                if let Err(e) = result {
                    error!(error = %e, "Background task ended abnormally");
                }
            }
        };

        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!(timeout_secs = timeout.as_secs(), "Background tasks still running at shutdown");
        }
    }
}

/// Graceful shutdown signal handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
