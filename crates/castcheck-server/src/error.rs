use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use castcheck_core::ContextError;
use castcheck_ingest::IngestError;
use castcheck_report::ReportError;
use castcheck_review::{ModelError, ReviewError};

/// Failure of a `POST /analyze` request.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("invalid upload: {0}")]
    BadRequest(String),

    #[error("invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("invalid casting parameters: {0}")]
    Context(#[from] ContextError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("failed to store drawing: {0}")]
    Store(#[source] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalyzeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalyzeError::BadRequest(_) | AnalyzeError::Context(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::Multipart(e) => e.status(),
            AnalyzeError::Ingest(e) => match e {
                IngestError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                IngestError::CorruptFile(_) => StatusCode::UNPROCESSABLE_ENTITY,
                IngestError::RasterizerUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AnalyzeError::Review(e) => match e {
                ReviewError::PromptTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                ReviewError::Model(ModelError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
                ReviewError::Model(_) | ReviewError::UnparsableResponse { .. } => {
                    StatusCode::BAD_GATEWAY
                }
            },
            AnalyzeError::Report(_) | AnalyzeError::Store(_) | AnalyzeError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn raw_response(&self) -> Option<&str> {
        match self {
            AnalyzeError::Review(ReviewError::UnparsableResponse { raw_text, .. }) => {
                Some(raw_text)
            }
            _ => None,
        }
    }
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "analysis failed");
        } else {
            tracing::warn!(%status, error = %self, "analysis rejected");
        }

        let mut body = json!({ "status": "error", "error": self.to_string() });
        if let Some(raw) = self.raw_response() {
            body["raw_response"] = json!(raw);
        }
        (status, Json(body)).into_response()
    }
}

/// Failure of the report lookup and download endpoints.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("invalid file name `{0}`")]
    InvalidName(String),

    #[error("file `{0}` not found")]
    NotFound(String),

    #[error("file access failed: {0}")]
    Io(#[from] std::io::Error),
}

impl FileError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FileError::InvalidName(_) => StatusCode::BAD_REQUEST,
            FileError::NotFound(_) => StatusCode::NOT_FOUND,
            FileError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FileError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::warn!(%status, error = %self, "file request failed");
        (status, Json(json!({ "status": "error", "error": self.to_string() }))).into_response()
    }
}
