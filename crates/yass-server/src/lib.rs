//! YASS Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! HTTP API and background workers for media jobs: audio source separation,
//! text-to-speech and voice-model training.
//!
//! # Overview
//!
//! - **API Endpoints**: submit jobs, poll status, fetch results, stream stems
//! - **Job Queue**: PostgreSQL or in-memory store, worker pool, retry policy
//! - **Artifact Store**: S3-compatible or local storage with deferred deletion
//! - **Workspaces**: per-job scratch directories with guaranteed cleanup
//! - **Tools**: `yt-dlp`, Spleeter, edge-tts and RVC training scripts
//!
//! # Architecture
//!
//! HTTP handlers never run job bodies. A submission is stored as a `pending`
//! job and picked up by the worker pool, which runs the pipeline inside a
//! workspace, publishes the outputs and schedules each object's deletion as a
//! delayed job in the same store.
//!
//! ## Framework Stack
//!
//! - **Axum**: HTTP routing and extraction
//! - **SQLx**: PostgreSQL job store and migrations
//! - **Tower**: Middleware and service abstractions
//! - **AWS SDK**: S3-compatible artifact storage
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use yass_server::{config::Config, jobs};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = jobs::init_store(&config.jobs, &config.database).await?;
//!     let queue = jobs::JobQueue::new(store, Arc::new(jobs::SystemClock), config.jobs.max_attempts);
//!     queue.ping().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod jobs;
pub mod middleware;
pub mod runtime;
pub mod storage;
pub mod tools;
pub mod workspace;

pub use error::{AppError, AppResult};
