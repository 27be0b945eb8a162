use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::database::{
    CollectionStats, DistanceMetric, ScoredRecord, TAGS_FIELD, VectorRecord, VectorStore,
    check_dimensions,
};

/// 进程内向量库，暴力检索，用于测试和无外部依赖的本地运行
pub struct InMemoryStore {
    base_name: String,
    dimension: usize,
    collections: RwLock<HashMap<DistanceMetric, Vec<VectorRecord>>>,
}

impl InMemoryStore {
    pub fn new(base_name: &str, dimension: usize) -> Self {
        let collections = DistanceMetric::ALL
            .iter()
            .map(|metric| (*metric, Vec::new()))
            .collect();
        Self {
            base_name: base_name.to_string(),
            dimension,
            collections: RwLock::new(collections),
        }
    }

    fn missing(&self, metric: DistanceMetric) -> anyhow::Error {
        anyhow::anyhow!("Collection {} not found", metric.collection_name(&self.base_name))
    }
}

pub fn score(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    let pairs = a.iter().zip(b.iter());
    match metric {
        DistanceMetric::Cosine => {
            let dot: f32 = pairs.map(|(x, y)| x * y).sum();
            let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                0.0
            } else {
                dot / (norm_a * norm_b)
            }
        }
        DistanceMetric::Euclid => pairs.map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt(),
        DistanceMetric::Dot => pairs.map(|(x, y)| x * y).sum(),
        DistanceMetric::Manhattan => pairs.map(|(x, y)| (x - y).abs()).sum(),
    }
}

fn has_any_tag(payload: &serde_json::Value, tags: &[String]) -> bool {
    let Some(stored) = payload.get(TAGS_FIELD).and_then(|t| t.as_array()) else {
        return false;
    };
    stored
        .iter()
        .filter_map(|t| t.as_str())
        .any(|t| tags.iter().any(|want| want.trim().eq_ignore_ascii_case(t.trim())))
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ensure_collections(&self) -> Result<()> {
        let mut collections = self.collections.write().await;
        for metric in DistanceMetric::ALL {
            collections.entry(metric).or_default();
        }
        Ok(())
    }

    async fn upsert_vectors(&self, vectors: Vec<VectorRecord>) -> Result<()> {
        check_dimensions(self.dimension, &vectors)?;
        let mut collections = self.collections.write().await;
        for metric in DistanceMetric::ALL {
            let Some(records) = collections.get_mut(&metric) else {
                return Err(self.missing(metric));
            };
            for vec in &vectors {
                match records.iter_mut().find(|r| r.id == vec.id) {
                    Some(existing) => *existing = vec.clone(),
                    None => records.push(vec.clone()),
                }
            }
        }
        Ok(())
    }

    async fn search(&self, metric: DistanceMetric, query: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        if query.len() != self.dimension {
            anyhow::bail!(
                "Query dim mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            );
        }
        let collections = self.collections.read().await;
        let records = collections.get(&metric).ok_or_else(|| self.missing(metric))?;

        let mut scored: Vec<ScoredRecord> = records
            .iter()
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                score: score(metric, query, &r.embedding),
                payload: r.payload.clone(),
            })
            .collect();

        // 稳定排序，分数相同时保持插入顺序
        if metric.higher_is_better() {
            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        } else {
            scored.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
        }
        scored.truncate(limit);
        Ok(scored)
    }

    async fn find_by_tags(&self, metric: DistanceMetric, tags: &[String], limit: usize) -> Result<Vec<ScoredRecord>> {
        let collections = self.collections.read().await;
        let records = collections.get(&metric).ok_or_else(|| self.missing(metric))?;
        Ok(records
            .iter()
            .filter(|r| has_any_tag(&r.payload, tags))
            .take(limit)
            .map(|r| ScoredRecord {
                id: r.id.clone(),
                score: 0.0,
                payload: r.payload.clone(),
            })
            .collect())
    }

    async fn get_vector(&self, metric: DistanceMetric, id: &str) -> Result<Option<VectorRecord>> {
        let collections = self.collections.read().await;
        let records = collections.get(&metric).ok_or_else(|| self.missing(metric))?;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn delete_vector(&self, ids: Vec<String>) -> Result<()> {
        let mut collections = self.collections.write().await;
        for records in collections.values_mut() {
            records.retain(|r| !ids.contains(&r.id));
        }
        Ok(())
    }

    async fn collection_stats(&self) -> Result<Vec<CollectionStats>> {
        let collections = self.collections.read().await;
        Ok(DistanceMetric::ALL
            .iter()
            .filter_map(|metric| {
                collections.get(metric).map(|records| CollectionStats {
                    name: metric.collection_name(&self.base_name),
                    metric: *metric,
                    dimension: self.dimension,
                    points_count: records.len() as u64,
                    status: "green".to_string(),
                })
            })
            .collect())
    }

    async fn drop_collections(&self) -> Result<()> {
        self.collections.write().await.clear();
        Ok(())
    }

    async fn health(&self) -> Result<String> {
        Ok("in-memory".to_string())
    }
}
