use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexingError {
    #[error("File path not allowed: {}", .0.display())]
    PathDenied(PathBuf),
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Unsupported format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("Image read error: {0}")]
    Read(String),
    #[error("Metadata error: {0}")]
    Metadata(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type IndexingResult<T> = Result<T, IndexingError>;
