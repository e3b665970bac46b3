//! PostgreSQL-backed job store
//!
//! Claims use `FOR UPDATE SKIP LOCKED`, so any number of worker processes can
//! share one `jobs` table without handing the same job to two of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;
use yass_common::types::{ErrorDescriptor, JobKind, JobOutput, JobState};

use super::store::{lost_worker_error, JobStore, JobStoreError, StoreResult};
use super::types::{Completion, JobId, JobPayload, JobRecord, NewJob};
use crate::config::DatabaseConfig;

const JOB_COLUMNS: &str = "id, kind, payload, state, attempts, max_attempts, run_at, \
     created_at, updated_at, finished_at, output, error, last_error";

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    kind: String,
    payload: serde_json::Value,
    state: String,
    attempts: i32,
    max_attempts: i32,
    run_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    output: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
    last_error: Option<String>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = JobStoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |message: String| JobStoreError::Corrupt { id, message };

        let kind: JobKind = row.kind.parse().map_err(|e| corrupt(format!("{}", e)))?;
        let state: JobState = row.state.parse().map_err(|e| corrupt(format!("{}", e)))?;
        let payload: JobPayload = serde_json::from_value(row.payload)
            .map_err(|e| corrupt(format!("payload: {}", e)))?;
        let output: Option<JobOutput> = row
            .output
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| corrupt(format!("output: {}", e)))?;
        let error: Option<ErrorDescriptor> = row
            .error
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| corrupt(format!("error: {}", e)))?;

        Ok(JobRecord {
            id,
            kind,
            payload,
            state,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            max_attempts: u32::try_from(row.max_attempts).unwrap_or(0),
            run_at: row.run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            finished_at: row.finished_at,
            output,
            error,
            last_error: row.last_error,
        })
    }
}

fn to_json<T: serde::Serialize>(id: JobId, value: &T) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| JobStoreError::Corrupt {
        id,
        message: e.to_string(),
    })
}

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        info!("Connecting to job database");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        info!("Running job store migrations");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: NewJob, now: DateTime<Utc>) -> StoreResult<JobRecord> {
        let record = JobRecord::new(job, now);
        let payload = to_json(record.id, &record.payload)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, kind, payload, state, attempts, max_attempts,
                              run_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, $5, $6, $7, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.kind.as_str())
        .bind(payload)
        .bind(record.state.as_str())
        .bind(record.max_attempts as i32)
        .bind(record.run_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %record.id, kind = %record.kind, "Job inserted");
        Ok(record)
    }

    async fn get(&self, id: JobId) -> StoreResult<JobRecord> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or(JobStoreError::NotFound(id))?.try_into()
    }

    async fn claim(&self, now: DateTime<Utc>) -> StoreResult<Option<JobRecord>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'pending', updated_at = $1
            WHERE state = 'failed_retryable' AND run_at <= $1
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let row: Option<JobRow> = sqlx::query_as(
            r#"
            WITH next AS (
                SELECT id FROM jobs
                WHERE state = 'pending' AND run_at <= $1
                ORDER BY run_at, created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET state = 'running', attempts = jobs.attempts + 1, updated_at = $1
            FROM next
            WHERE jobs.id = next.id
            RETURNING jobs.*
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn complete(
        &self,
        id: JobId,
        attempt: u32,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> StoreResult<JobRecord> {
        let to = completion.target_state();
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, i32)> =
            sqlx::query_as("SELECT state, attempts FROM jobs WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((state, attempts)) = current else {
            return Err(JobStoreError::NotFound(id));
        };
        let from: JobState = state.parse().map_err(|e| JobStoreError::Corrupt {
            id,
            message: format!("{}", e),
        })?;
        super::store::check_attempt(id, u32::try_from(attempts).unwrap_or(0), attempt)?;
        super::store::check_transition(id, from, to)?;

        let query = match completion {
            Completion::Succeeded(output) => sqlx::query(
                r#"
                UPDATE jobs
                SET state = $2, output = $3, finished_at = $4, updated_at = $4
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(to.as_str())
            .bind(to_json(id, &output)?)
            .bind(now),
            Completion::Retry { error, retry_at } => sqlx::query(
                r#"
                UPDATE jobs
                SET state = $2, last_error = $3, run_at = $4, updated_at = $5
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(to.as_str())
            .bind(error.message)
            .bind(retry_at)
            .bind(now),
            Completion::Failed(error) => sqlx::query(
                r#"
                UPDATE jobs
                SET state = $2, error = $3, last_error = $4, finished_at = $5, updated_at = $5
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(to.as_str())
            .bind(to_json(id, &error)?)
            .bind(error.message.clone())
            .bind(now),
        };
        query.execute(&mut *tx).await?;

        let row: JobRow =
            sqlx::query_as(&format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS))
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn heartbeat(&self, id: JobId, attempt: u32, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET updated_at = $3
            WHERE id = $1 AND state = 'running' AND attempts = $2
            "#,
        )
        .bind(id)
        .bind(i32::try_from(attempt).unwrap_or(i32::MAX))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn recover_stale(
        &self,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let stale: Vec<(Uuid, i32, i32)> = sqlx::query_as(
            r#"
            SELECT id, attempts, max_attempts FROM jobs
            WHERE state = 'running' AND updated_at < $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(stale_before)
        .fetch_all(&mut *tx)
        .await?;

        for (id, attempts, max_attempts) in &stale {
            let error = lost_worker_error(u32::try_from(*attempts).unwrap_or(0));
            if attempts < max_attempts {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET state = 'failed_retryable', last_error = $2, run_at = $3, updated_at = $3
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(&error.message)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET state = 'failed', error = $2, last_error = $3,
                        finished_at = $4, updated_at = $4
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(to_json(*id, &error)?)
                .bind(&error.message)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(stale.len() as u64)
    }

    async fn purge_finished(&self, finished_before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE state IN ('succeeded', 'failed') AND finished_at < $1
            "#,
        )
        .bind(finished_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
