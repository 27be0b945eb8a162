use std::path::PathBuf;

use imgrag_indexing::IndexingError;

/// 处理流程中各阶段的失败，`kind()` 是对外稳定的错误名
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("File path not allowed: {}", .0.display())]
    PathDenied(PathBuf),
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Unsupported format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("Image read error: {0}")]
    Read(String),
    #[error("AI analysis failed: {0}")]
    AiAnalysis(String),
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Database storage failed: {0}")]
    Store(String),
    #[error("No supported image files found in {}", .0.display())]
    NoImagesFound(PathBuf),
}

impl ProcessError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessError::PathDenied(_) => "path_denied",
            ProcessError::NotFound(_) => "not_found",
            ProcessError::UnsupportedFormat(_) => "unsupported_format",
            ProcessError::Read(_) => "read_error",
            ProcessError::AiAnalysis(_) => "ai_analysis_failed",
            ProcessError::Embedding(_) => "embedding_failed",
            ProcessError::Store(_) => "store_failed",
            ProcessError::NoImagesFound(_) => "no_images_found",
        }
    }
}

impl From<IndexingError> for ProcessError {
    fn from(err: IndexingError) -> Self {
        match err {
            IndexingError::PathDenied(path) => ProcessError::PathDenied(path),
            IndexingError::NotFound(path) => ProcessError::NotFound(path),
            IndexingError::UnsupportedFormat(path) => ProcessError::UnsupportedFormat(path),
            IndexingError::Read(msg) => ProcessError::Read(msg),
            other => ProcessError::Read(other.to_string()),
        }
    }
}

pub type ProcessResult<T> = Result<T, ProcessError>;
