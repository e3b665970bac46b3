//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use yass_common::types::ErrorDescriptor;

use crate::api::response::ErrorResponse;
use crate::jobs::{JobId, QueueError};

pub type AppResult<T> = std::result::Result<T, AppError>;

/// Errors surfaced by HTTP handlers
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job {job_id} failed: {}", .descriptor.message)]
    JobFailed {
        job_id: JobId,
        descriptor: ErrorDescriptor,
    },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::JobFailed { .. } | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::JobFailed { .. } => "JOB_FAILED",
            AppError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::NotFound(id) => AppError::NotFound(format!("Job {} not found", id)),
            QueueError::JobFailed { id, descriptor } => AppError::JobFailed {
                job_id: id,
                descriptor,
            },
            other => {
                tracing::error!(error = %other, "Job queue error");
                AppError::Internal("The job queue is unavailable".to_string())
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let body = match self {
            AppError::NotFound(message)
            | AppError::Validation(message)
            | AppError::Unavailable(message) => ErrorResponse::new(code, message),
            AppError::JobFailed { job_id, descriptor } => ErrorResponse::with_details(
                code,
                descriptor.message.clone(),
                json!({
                    "job_id": job_id,
                    "kind": descriptor.kind,
                    "attempts": descriptor.attempts,
                }),
            ),
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                ErrorResponse::new(code, message)
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use yass_common::types::ErrorKind;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_is_bad_request() {
        let response = AppError::Validation("text is required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "text is required");
    }

    #[tokio::test]
    async fn test_job_failed_carries_descriptor() {
        let job_id = uuid::Uuid::new_v4();
        let response = AppError::JobFailed {
            job_id,
            descriptor: ErrorDescriptor {
                kind: ErrorKind::UpstreamUnavailable,
                message: "video is private".to_string(),
                attempts: 3,
            },
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["message"], "video is private");
        assert_eq!(body["error"]["details"]["kind"], "upstream_unavailable");
        assert_eq!(body["error"]["details"]["attempts"], 3);
        assert_eq!(body["error"]["details"]["job_id"], job_id.to_string());
    }

    #[test]
    fn test_queue_not_found_maps_to_404() {
        let err: AppError = QueueError::NotFound(uuid::Uuid::new_v4()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
