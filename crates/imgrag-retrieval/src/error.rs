use std::path::PathBuf;

use imgrag_indexing::IndexingError;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Please provide a text query, an image, an embedding or tags")]
    NoQueryProvided,
    #[error("File path not allowed: {}", .0.display())]
    PathDenied(PathBuf),
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Image read error: {0}")]
    Read(String),
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Search failed: {0}")]
    Store(String),
}

impl SearchError {
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::NoQueryProvided => "no_query_provided",
            SearchError::PathDenied(_) => "path_denied",
            SearchError::NotFound(_) => "not_found",
            SearchError::Read(_) => "read_error",
            SearchError::Embedding(_) => "embedding_failed",
            SearchError::Store(_) => "store_failed",
        }
    }
}

impl From<IndexingError> for SearchError {
    fn from(err: IndexingError) -> Self {
        match err {
            IndexingError::PathDenied(path) => SearchError::PathDenied(path),
            IndexingError::NotFound(path) => SearchError::NotFound(path),
            IndexingError::Read(msg) => SearchError::Read(msg),
            other => SearchError::Read(other.to_string()),
        }
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
