use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::database::{
    CollectionStats, DistanceMetric, ScoredRecord, TAGS_FIELD, VectorRecord, VectorStore,
    check_dimensions,
};

#[derive(Deserialize, Debug)]
struct QdrantPoint {
    id: Value,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

#[derive(Deserialize, Debug)]
struct PointList {
    points: Vec<QdrantPoint>,
}

impl QdrantPoint {
    fn id_string(&self) -> String {
        match &self.id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// 通过 REST 接口访问 Qdrant，每种度量一个集合
pub struct QdrantStore {
    base_url: String,
    api_key: Option<String>,
    collection_base: String,
    dimension: usize,
    client: Client,
}

impl QdrantStore {
    pub fn new(base_url: &str, collection_base: &str, dimension: usize, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Qdrant http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            collection_base: collection_base.to_string(),
            dimension,
            client,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    pub fn collection(&self, metric: DistanceMetric) -> String {
        metric.collection_name(&self.collection_base)
    }

    /// 发送请求并取出响应中的 `result` 字段
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method.clone(), &url);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("api-key", api_key);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let resp = builder
            .send()
            .await
            .with_context(|| format!("Qdrant request {} {} failed", method, path))?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["status"]["error"].as_str().map(str::to_string))
                .unwrap_or_else(|| text.trim().to_string());
            anyhow::bail!("Qdrant {} {} returned {}: {}", method, path, status, message);
        }

        let mut value: Value = serde_json::from_str(&text)
            .with_context(|| format!("Invalid Qdrant response for {}", path))?;
        Ok(value.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    async fn exists(&self, collection: &str) -> Result<bool> {
        let result = self
            .call(Method::GET, &format!("/collections/{}/exists", collection), None)
            .await?;
        Ok(result["exists"].as_bool().unwrap_or(false))
    }

    fn to_scored(point: QdrantPoint) -> ScoredRecord {
        ScoredRecord {
            id: point.id_string(),
            score: point.score,
            payload: point.payload.unwrap_or(Value::Null),
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ensure_collections(&self) -> Result<()> {
        for metric in DistanceMetric::ALL {
            let collection = self.collection(metric);
            if self.exists(&collection).await? {
                debug!("Collection {} already exists", collection);
                continue;
            }
            let body = json!({
                "vectors": {
                    "size": self.dimension,
                    "distance": qdrant_distance(metric),
                }
            });
            self.call(Method::PUT, &format!("/collections/{}", collection), Some(body))
                .await?;
            info!("Created collection {} ({}, dim {})", collection, metric, self.dimension);
        }
        Ok(())
    }

    async fn upsert_vectors(&self, vectors: Vec<VectorRecord>) -> Result<()> {
        check_dimensions(self.dimension, &vectors)?;
        if vectors.is_empty() {
            return Ok(());
        }
        let points: Vec<Value> = vectors
            .iter()
            .map(|vec| json!({ "id": vec.id, "vector": vec.embedding, "payload": vec.payload }))
            .collect();
        let body = json!({ "points": points });

        for metric in DistanceMetric::ALL {
            let path = format!("/collections/{}/points?wait=true", self.collection(metric));
            self.call(Method::PUT, &path, Some(body.clone())).await?;
        }
        debug!("Upserted {} points into {} collections", vectors.len(), DistanceMetric::ALL.len());
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
        let body = json!({
            "query": query,
            "limit": limit,
            "with_payload": true,
            "params": { "hnsw_ef": 256, "exact": true },
        });
        let path = format!("/collections/{}/points/query", self.collection(metric));
        let result = self.call(Method::POST, &path, Some(body)).await?;
        let list: PointList = serde_json::from_value(result).context("Invalid query result")?;
        Ok(list.points.into_iter().map(Self::to_scored).collect())
    }

    async fn find_by_tags(&self, metric: DistanceMetric, tags: &[String], limit: usize) -> Result<Vec<ScoredRecord>> {
        let body = json!({
            "filter": {
                "should": [{ "key": TAGS_FIELD, "match": { "any": tags } }]
            },
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        let path = format!("/collections/{}/points/scroll", self.collection(metric));
        let result = self.call(Method::POST, &path, Some(body)).await?;
        let list: PointList = serde_json::from_value(result).context("Invalid scroll result")?;
        Ok(list
            .points
            .into_iter()
            .map(|point| ScoredRecord { score: 0.0, ..Self::to_scored(point) })
            .collect())
    }

    async fn get_vector(&self, metric: DistanceMetric, id: &str) -> Result<Option<VectorRecord>> {
        let body = json!({ "ids": [id], "with_payload": true, "with_vector": true });
        let path = format!("/collections/{}/points", self.collection(metric));
        let result = self.call(Method::POST, &path, Some(body)).await?;
        let points: Vec<QdrantPoint> = serde_json::from_value(result).context("Invalid retrieve result")?;

        Ok(points.into_iter().next().map(|point| VectorRecord {
            id: point.id_string(),
            embedding: point.vector.unwrap_or_default(),
            payload: point.payload.unwrap_or(Value::Null),
        }))
    }

    async fn delete_vector(&self, ids: Vec<String>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = json!({ "points": ids });
        for metric in DistanceMetric::ALL {
            let path = format!("/collections/{}/points/delete?wait=true", self.collection(metric));
            self.call(Method::POST, &path, Some(body.clone())).await?;
        }
        Ok(())
    }

    async fn collection_stats(&self) -> Result<Vec<CollectionStats>> {
        let mut stats = Vec::new();
        for metric in DistanceMetric::ALL {
            let collection = self.collection(metric);
            if !self.exists(&collection).await? {
                continue;
            }
            let info = self
                .call(Method::GET, &format!("/collections/{}", collection), None)
                .await?;
            stats.push(CollectionStats {
                name: collection,
                metric,
                dimension: info["config"]["params"]["vectors"]["size"]
                    .as_u64()
                    .map(|d| d as usize)
                    .unwrap_or(self.dimension),
                points_count: info["points_count"].as_u64().unwrap_or(0),
                status: info["status"].as_str().unwrap_or("unknown").to_string(),
            });
        }
        Ok(stats)
    }

    async fn drop_collections(&self) -> Result<()> {
        for metric in DistanceMetric::ALL {
            let collection = self.collection(metric);
            if self.exists(&collection).await? {
                self.call(Method::DELETE, &format!("/collections/{}", collection), None)
                    .await?;
                info!("Dropped collection {}", collection);
            }
        }
        Ok(())
    }

    async fn health(&self) -> Result<String> {
        let url = format!("{}/", self.base_url);
        let mut builder = self.client.get(&url);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("api-key", api_key);
        }
        let resp = builder.send().await.context("Qdrant is unreachable")?;
        if !resp.status().is_success() {
            anyhow::bail!("Qdrant health check returned {}", resp.status());
        }
        let body: Value = resp.json().await?;
        Ok(format!("qdrant {}", body["version"].as_str().unwrap_or("unknown")))
    }
}

fn qdrant_distance(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "Cosine",
        DistanceMetric::Euclid => "Euclid",
        DistanceMetric::Dot => "Dot",
        DistanceMetric::Manhattan => "Manhattan",
    }
}
