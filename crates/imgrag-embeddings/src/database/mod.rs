pub mod memory;
pub mod pgvector;
pub mod qdrant;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// payload 中存放标签的字段，按标签过滤时使用
pub const TAGS_FIELD: &str = "ai_tags";

/// 每种距离度量对应一个集合，集合名为 `<base>_<metric>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclid,
    Dot,
    Manhattan,
}

impl DistanceMetric {
    pub const ALL: [DistanceMetric; 4] = [
        DistanceMetric::Cosine,
        DistanceMetric::Euclid,
        DistanceMetric::Dot,
        DistanceMetric::Manhattan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclid => "euclid",
            DistanceMetric::Dot => "dot",
            DistanceMetric::Manhattan => "manhattan",
        }
    }

    /// cosine / dot 为相似度（越大越好），euclid / manhattan 为距离（越小越好）
    pub fn higher_is_better(&self) -> bool {
        matches!(self, DistanceMetric::Cosine | DistanceMetric::Dot)
    }

    pub fn collection_name(&self, base: &str) -> String {
        format!("{}_{}", base, self.as_str())
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclid" | "euclidean" | "l2" => Ok(DistanceMetric::Euclid),
            "dot" | "dot_product" | "ip" => Ok(DistanceMetric::Dot),
            "manhattan" | "l1" => Ok(DistanceMetric::Manhattan),
            other => Err(format!("unknown distance metric: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub payload: JsonValue,
}

/// 查询结果；按标签检索时 `score` 为 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub score: f32,
    pub payload: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub metric: DistanceMetric,
    pub dimension: usize,
    pub points_count: u64,
    pub status: String,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 所有集合共用的向量维度
    fn dimension(&self) -> usize;

    /// 为每种度量创建缺失的集合
    async fn ensure_collections(&self) -> Result<()>;

    /// 写入所有集合，维度不符时整体拒绝
    async fn upsert_vectors(&self, vectors: Vec<VectorRecord>) -> Result<()>;

    /// 在单个集合中做最近邻检索，结果按该度量从好到差排列
    async fn search(&self, metric: DistanceMetric, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>>;

    /// 返回 payload 标签中包含任一 `tags` 的记录
    async fn find_by_tags(&self, metric: DistanceMetric, tags: &[String], limit: usize) -> Result<Vec<ScoredRecord>>;

    async fn get_vector(&self, metric: DistanceMetric, id: &str) -> Result<Option<VectorRecord>>;

    /// 从所有集合中删除
    async fn delete_vector(&self, ids: Vec<String>) -> Result<()>;

    async fn collection_stats(&self) -> Result<Vec<CollectionStats>>;

    async fn drop_collections(&self) -> Result<()>;

    async fn health(&self) -> Result<String>;
}

pub(crate) fn check_dimensions(expected: usize, vectors: &[VectorRecord]) -> Result<()> {
    for vec in vectors {
        if vec.embedding.len() != expected {
            anyhow::bail!(
                "Embedding dim mismatch: expected {}, got {}",
                expected,
                vec.embedding.len()
            );
        }
    }
    Ok(())
}
