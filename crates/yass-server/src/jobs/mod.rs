//! Background job system
//!
//! ```text
//! HTTP handler ──submit──► JobQueue ──► JobStore (memory | postgres)
//!                                           ▲
//!                 WorkerPool ──claim/complete┘
//!                     │
//!                     └──► PipelineExecutor ──► tools, workspace, storage
//!                                               └─► schedule_deletion (delayed job)
//! ```

use std::sync::Arc;

pub mod clock;
pub mod config;
pub mod executor;
pub mod memory;
pub mod policy;
pub mod postgres;
pub mod queue;
pub mod reaper;
pub mod store;
pub mod types;
pub mod worker;

pub use clock::{Clock, SystemClock, TokioClock};
pub use executor::{PipelineExecutor, PipelineTools};
pub use memory::MemoryJobStore;
pub use policy::{RetryDecision, RetryPolicy};
pub use postgres::PgJobStore;
pub use queue::{JobQueue, QueueError};
pub use reaper::{Reaper, ReaperConfig};
pub use store::{JobStore, JobStoreError};
pub use types::{Completion, JobId, JobPayload, JobRecord, NewJob};
pub use worker::{JobError, JobHandler, WorkerPool, WorkerPoolHandle};

use crate::config::DatabaseConfig;
use config::{JobBackend, JobsConfig};

/// Open the configured store
pub async fn init_store(
    config: &JobsConfig,
    database: &DatabaseConfig,
) -> Result<Arc<dyn JobStore>, JobStoreError> {
    let store: Arc<dyn JobStore> = match config.backend {
        JobBackend::Memory => Arc::new(MemoryJobStore::new()),
        JobBackend::Postgres => Arc::new(PgJobStore::connect(database).await?),
    };
    Ok(store)
}

impl ReaperConfig {
    pub fn from_jobs_config(config: &JobsConfig) -> Self {
        Self {
            result_retention: config.result_retention(),
            stale_after: std::time::Duration::from_secs(config.stale_after_secs),
            interval: std::time::Duration::from_secs(config.reaper_interval_secs),
        }
    }
}

impl RetryPolicy {
    pub fn from_jobs_config(config: &JobsConfig) -> Self {
        Self::new(config.max_attempts, config.retry_backoff())
    }
}
