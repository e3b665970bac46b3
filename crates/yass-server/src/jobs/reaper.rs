//! Periodic housekeeping for the job table
//!
//! Finished jobs are kept for the result-retention window so clients can
//! still read them, then purged. Jobs whose worker vanished mid-attempt are
//! handed back to the retry path.

use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::to_chrono;
use super::queue::JobQueue;
use super::store::JobStoreError;

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub result_retention: Duration,
    pub stale_after: Duration,
    pub interval: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReaperReport {
    pub purged: u64,
    pub recovered: u64,
}

impl ReaperReport {
    pub fn is_empty(&self) -> bool {
        self.purged == 0 && self.recovered == 0
    }
}

pub struct Reaper {
    queue: JobQueue,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(queue: JobQueue, config: ReaperConfig) -> Self {
        Self { queue, config }
    }

    pub async fn run_once(&self) -> Result<ReaperReport, JobStoreError> {
        let now = self.queue.clock().now();
        let store = self.queue.store();

        let recovered = store
            .recover_stale(now - to_chrono(self.config.stale_after), now)
            .await?;
        let purged = store
            .purge_finished(now - to_chrono(self.config.result_retention))
            .await?;

        Ok(ReaperReport { purged, recovered })
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Reaper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.run_once().await {
                            Ok(report) if report.is_empty() => {}
                            Ok(report) => info!(purged = report.purged, recovered = report.recovered, "Reaped jobs"),
                            Err(e) => warn!(error = %e, "Reaper pass failed"),
                        }
                    }
                }
            }
        })
    }
}
