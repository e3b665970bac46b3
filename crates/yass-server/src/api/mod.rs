pub mod response;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::config::CorsConfig;
use crate::features::{self, FeatureState};
use crate::middleware;

/// Build the HTTP application
///
/// Feature routes are mounted at the root and again under `/api/v1`.
pub fn create_router(state: FeatureState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(features::router())
        .nest("/api/v1", features::router())
        .with_state(state)
        .layer(middleware::compression_layer())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "YASS Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Liveness plus job-store reachability
async fn health(State(state): State<FeatureState>) -> Response {
    match state.queue.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "queue": "reachable"
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Job store health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "queue": "unreachable"
                })),
            )
                .into_response()
        },
    }
}
