//! 以文本、图片、原始向量或标签检索已入库的图片

pub mod error;
pub mod query;
pub mod router;

pub use error::{SearchError, SearchResult};
pub use query::{SearchHit, SearchQuery, SearchResponse};
pub use router::SearchRouter;
