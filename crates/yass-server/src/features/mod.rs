//! Feature modules implementing the YASS API
//!
//! Each feature is a vertical slice with its own commands, queries and routes.
//!
//! # Features
//!
//! - **jobs**: Job submission, status and results
//! - **stream**: Chunked delivery of separated stems from a kept workspace
//!
//! # Architecture
//!
//! - `commands/` - Write operations (job submission)
//! - `queries/` - Read operations (status, result, stream)
//! - `routes.rs` - HTTP route definitions and error mapping
//!
//! Each command and query module exposes an async `handle` function.
//! Routes call these handlers directly; there is no mediator or handler
//! registry in between, so a slice adds an operation by adding a handler
//! and a route.

pub mod jobs;
pub mod shared;
pub mod stream;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;

use crate::jobs::JobQueue;
use crate::tools::Downloader;
use crate::workspace::WorkspaceManager;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub queue: JobQueue,
    pub workspaces: WorkspaceManager,
    /// Used to probe separation sources before they are queued
    pub downloader: Arc<dyn Downloader>,
    pub max_source_duration: Duration,
}

/// Creates the feature router
///
/// - `/jobs` - Job submission and polling
/// - `/stream` - Stem streaming
pub fn router() -> Router<FeatureState> {
    Router::new()
        .nest("/jobs", jobs::jobs_routes())
        .nest("/stream", stream::stream_routes())
}
