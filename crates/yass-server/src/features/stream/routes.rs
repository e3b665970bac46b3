//! Stream routes
//!
//! - `GET /stream/:kind/:workspace_id/:name` - Chunked `audio/wav` body

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use super::queries::{open_stream, OpenStreamError, OpenStreamQuery, STREAM_CONTENT_TYPE};
use crate::error::{AppError, AppResult};
use crate::features::FeatureState;

pub fn stream_routes() -> Router<FeatureState> {
    Router::new().route("/:kind/:workspace_id/:name", get(stream_stem))
}

async fn stream_stem(
    State(state): State<FeatureState>,
    Path((kind, workspace_id, name)): Path<(String, String, String)>,
) -> AppResult<Response> {
    let query = OpenStreamQuery {
        kind,
        workspace_id,
        name,
    };
    let stream = open_stream::handle(&state.workspaces, query).await?;

    Ok((
        [(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)],
        Body::from_stream(stream),
    )
        .into_response())
}

impl From<OpenStreamError> for AppError {
    fn from(err: OpenStreamError) -> Self {
        match err {
            OpenStreamError::InvalidKind(_) => AppError::Validation(err.to_string()),
            OpenStreamError::NotFound => AppError::NotFound(err.to_string()),
            OpenStreamError::Io(e) => AppError::Internal(format!("Could not open stream: {}", e)),
        }
    }
}
