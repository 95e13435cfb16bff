use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use box_annotation::AnnotationError;

#[derive(Debug)]
pub enum ApiError {
    Core(AnnotationError),
    UnknownClass(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<AnnotationError> for ApiError {
    fn from(e: AnnotationError) -> Self {
        ApiError::Core(e)
    }
}

impl ApiError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::UnknownClass(_) => (StatusCode::UNPROCESSABLE_ENTITY, "unknown_class"),
            ApiError::Core(core) => match core {
                AnnotationError::InvalidGeometry(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_geometry")
                }
                AnnotationError::DuplicateAnnotationId { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "duplicate_annotation_id")
                }
                AnnotationError::DuplicateTrackId { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "duplicate_track_id")
                }
                AnnotationError::InvalidFrameId(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_frame_id")
                }
                AnnotationError::AnnotationNotFound(_) => (StatusCode::NOT_FOUND, "annotation_not_found"),
                AnnotationError::FrameNotFound(_) => (StatusCode::NOT_FOUND, "frame_not_found"),
                AnnotationError::EmptySequence(_) => (StatusCode::CONFLICT, "empty_sequence"),
                AnnotationError::NotReady(_) => (StatusCode::CONFLICT, "not_ready"),
                AnnotationError::Persistence { .. } | AnnotationError::CorruptFile { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "persistence")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.classify();
        let message = match &self {
            ApiError::Core(e) => e.to_string(),
            ApiError::UnknownClass(id) => format!("Unknown class id: {id}"),
        };
        if status.is_server_error() {
            error!(error = %message, "request failed");
        }
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}
