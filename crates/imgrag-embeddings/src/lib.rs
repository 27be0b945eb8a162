//! 向量嵌入客户端与向量库适配

pub mod client;
pub mod database;
pub mod embedding;

pub use client::clip::ClipEmbeddingClient;
pub use client::{EmbeddingClient, EmbeddingError, EmbeddingResult};
pub use database::{DistanceMetric, ScoredRecord, VectorRecord, VectorStore};
