use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use imgrag_retrieval::SearchError;
use serde_json::json;
use tracing::error;

use crate::error::ProcessError;

/// API错误类型，响应体为 `{"error": kind, "message": text}`
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_request",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: message.into(),
        }
    }

    fn from_kind(kind: &'static str, message: String) -> Self {
        let status = match kind {
            "path_denied" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "ai_analysis_failed" | "embedding_failed" => StatusCode::BAD_GATEWAY,
            "store_failed" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self { status, kind, message }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{}: {}", self.kind, self.message);
        }
        let body = Json(json!({ "error": self.kind, "message": self.message }));
        (self.status, body).into_response()
    }
}

impl From<ProcessError> for AppError {
    fn from(err: ProcessError) -> Self {
        Self::from_kind(err.kind(), err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        Self::from_kind(err.kind(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::from(ProcessError::PathDenied(PathBuf::from("/etc"))), StatusCode::FORBIDDEN),
            (AppError::from(ProcessError::UnsupportedFormat(PathBuf::from("a.txt"))), StatusCode::BAD_REQUEST),
            (AppError::from(ProcessError::Read("bad".into())), StatusCode::BAD_REQUEST),
            (AppError::from(ProcessError::AiAnalysis("timeout".into())), StatusCode::BAD_GATEWAY),
            (AppError::from(SearchError::Embedding("down".into())), StatusCode::BAD_GATEWAY),
            (AppError::from(SearchError::Store("gone".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::from(SearchError::NoQueryProvided), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(err.status, status, "{}", err.kind);
        }
    }
}
