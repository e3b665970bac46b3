//! Job API routes
//!
//! # Route Structure
//!
//! - `POST /jobs/tts` - Queue speech synthesis (JSON or form body)
//! - `POST /jobs/separate` - Probe the source, then queue separation
//! - `POST /jobs/train` - Queue voice-model training
//! - `POST /jobs/convert` - Queue voice conversion with a trained model
//! - `GET /jobs/:job_id/status` - Current state and attempt count
//! - `GET /jobs/:job_id/result` - Output, failure descriptor, or state

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Router,
};

use super::commands::{
    self, SubmitConversionCommand, SubmitConversionError, SubmitSeparationCommand,
    SubmitSeparationError, SubmitTrainingCommand, SubmitTrainingError, SubmitTtsCommand,
    SubmitTtsError,
};
use super::queries::{self, GetJobResultQuery, GetJobStatusQuery};
use crate::api::response::ApiResponse;
use crate::error::{AppError, AppResult};
use crate::features::shared::JsonOrForm;
use crate::features::FeatureState;
use crate::jobs::JobId;

pub fn jobs_routes() -> Router<FeatureState> {
    Router::new()
        .route("/tts", post(submit_tts))
        .route("/separate", post(submit_separation))
        .route("/train", post(submit_training))
        .route("/convert", post(submit_conversion))
        .route("/:job_id/status", get(get_status))
        .route("/:job_id/result", get(get_result))
}

/// Unknown and malformed ids both read as "no such job"
fn parse_job_id(raw: &str) -> AppResult<JobId> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("Job {} not found", raw)))
}

// ============================================================================
// Command Handlers
// ============================================================================

/// Queue speech synthesis
///
/// # Request Body
///
/// ```json
/// { "text": "안녕하세요", "voice": "ko-KR-SunHiNeural" }
/// ```
///
/// # Response
///
/// - `202 Accepted` - `{job_id, kind}`
/// - `400 Bad Request` - Empty text or malformed voice
async fn submit_tts(
    State(state): State<FeatureState>,
    JsonOrForm(command): JsonOrForm<SubmitTtsCommand>,
) -> AppResult<Response> {
    let response = commands::submit_tts::handle(&state.queue, command).await?;
    Ok(ApiResponse::success(response).with_status(StatusCode::ACCEPTED))
}

/// Queue separation of a remote source
///
/// # Response
///
/// - `202 Accepted` - `{job_id, kind}`
/// - `400 Bad Request` - Bad URL, missing source, unknown duration, or too long
/// - `503 Service Unavailable` - The probe itself failed
async fn submit_separation(
    State(state): State<FeatureState>,
    JsonOrForm(command): JsonOrForm<SubmitSeparationCommand>,
) -> AppResult<Response> {
    let response = commands::submit_separation::handle(
        &state.queue,
        state.downloader.as_ref(),
        state.max_source_duration,
        command,
    )
    .await?;
    Ok(ApiResponse::success(response).with_status(StatusCode::ACCEPTED))
}

async fn submit_training(
    State(state): State<FeatureState>,
    JsonOrForm(command): JsonOrForm<SubmitTrainingCommand>,
) -> AppResult<Response> {
    let response = commands::submit_training::handle(&state.queue, command).await?;
    Ok(ApiResponse::success(response).with_status(StatusCode::ACCEPTED))
}

/// Queue voice conversion
///
/// # Request Body
///
/// ```json
/// {
///   "vocals": { "bucket": "separation-bucket", "object_name": "...-vocals.wav" },
///   "accompaniment": { "bucket": "separation-bucket", "object_name": "...-accompaniment.wav" },
///   "model": { "bucket": "training-bucket", "object_name": "...-narrator.pth" },
///   "index": { "bucket": "training-bucket", "object_name": "...-added_narrator.index" },
///   "pitch": -2
/// }
/// ```
///
/// # Response
///
/// - `202 Accepted` - `{job_id, kind}`
/// - `400 Bad Request` - Malformed object reference, pitch or index rate
async fn submit_conversion(
    State(state): State<FeatureState>,
    JsonOrForm(command): JsonOrForm<SubmitConversionCommand>,
) -> AppResult<Response> {
    let response = commands::submit_conversion::handle(&state.queue, command).await?;
    Ok(ApiResponse::success(response).with_status(StatusCode::ACCEPTED))
}

// ============================================================================
// Query Handlers
// ============================================================================

async fn get_status(
    State(state): State<FeatureState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let query = GetJobStatusQuery {
        job_id: parse_job_id(&job_id)?,
    };
    let status = queries::get_status::handle(&state.queue, query).await?;
    Ok(ApiResponse::success(status).with_status(StatusCode::OK))
}

/// # Response
///
/// - `200 OK` - Artifacts and stream links once succeeded, `{job_id, state}` before
/// - `404 Not Found` - Unknown job
/// - `500 Internal Server Error` - The job failed; the body carries its descriptor
async fn get_result(
    State(state): State<FeatureState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let query = GetJobResultQuery {
        job_id: parse_job_id(&job_id)?,
    };
    let result = queries::get_result::handle(&state.queue, query).await?;
    Ok(ApiResponse::success(result).with_status(StatusCode::OK))
}

// ============================================================================
// Error Mapping
// ============================================================================

impl From<SubmitTtsError> for AppError {
    fn from(err: SubmitTtsError) -> Self {
        match err {
            SubmitTtsError::Invalid(message) => AppError::Validation(message),
            SubmitTtsError::Queue(e) => e.into(),
        }
    }
}

impl From<SubmitTrainingError> for AppError {
    fn from(err: SubmitTrainingError) -> Self {
        match err {
            SubmitTrainingError::Invalid(message) => AppError::Validation(message),
            SubmitTrainingError::Queue(e) => e.into(),
        }
    }
}

impl From<SubmitConversionError> for AppError {
    fn from(err: SubmitConversionError) -> Self {
        match err {
            SubmitConversionError::Invalid(message) => AppError::Validation(message),
            SubmitConversionError::Queue(e) => e.into(),
        }
    }
}

impl From<SubmitSeparationError> for AppError {
    fn from(err: SubmitSeparationError) -> Self {
        match err {
            SubmitSeparationError::Queue(e) => e.into(),
            SubmitSeparationError::ProbeFailed(_) => {
                tracing::warn!(error = %err, "Source probe failed");
                AppError::Unavailable(err.to_string())
            },
            SubmitSeparationError::InvalidUrl(_)
            | SubmitSeparationError::SourceUnavailable(_)
            | SubmitSeparationError::DurationUnknown
            | SubmitSeparationError::TooLong { .. } => AppError::Validation(err.to_string()),
        }
    }
}
