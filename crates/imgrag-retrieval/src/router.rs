use std::path::Path;
use std::sync::Arc;

use imgrag_embeddings::database::ScoredRecord;
use imgrag_embeddings::embedding::payload_from_scored;
use imgrag_embeddings::{DistanceMetric, EmbeddingClient, VectorStore};
use imgrag_indexing::image_file::load_for_model;
use imgrag_indexing::{IndexingError, PathValidator};
use tracing::{debug, info};

use crate::error::{SearchError, SearchResult};
use crate::query::{SearchHit, SearchQuery, SearchResponse};

/// 带标签过滤时向库里多取的倍数
pub const TAG_FILTER_OVERFETCH: usize = 4;

/// 把查询转换为向量检索或标签检索
pub struct SearchRouter {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    paths: PathValidator,
    max_image_size: u32,
}

impl SearchRouter {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, store: Arc<dyn VectorStore>, paths: PathValidator) -> Self {
        Self {
            embedder,
            store,
            paths,
            max_image_size: 1024,
        }
    }

    pub fn with_max_image_size(mut self, max_image_size: u32) -> Self {
        self.max_image_size = max_image_size;
        self
    }

    pub async fn search(&self, query: &SearchQuery) -> SearchResult<SearchResponse> {
        let tags = query.normalized_tags();
        let limit = query.limit.max(1);

        if !query.has_vector_source() && tags.is_empty() {
            return Err(SearchError::NoQueryProvided);
        }

        let results = match self.query_vector(query).await? {
            Some(vector) => self.search_by_vector(query.metric, &vector, &tags, limit).await?,
            None => self.search_by_tags(query.metric, &tags, limit).await?,
        };

        info!(
            "search '{}' on {} returned {} results",
            query.describe(),
            query.metric,
            results.len()
        );
        Ok(SearchResponse {
            query: query.describe(),
            metric: query.metric,
            limit,
            total_found: results.len(),
            results,
        })
    }

    /// 按 embedding > 图片 > 文本 的优先级得到查询向量
    async fn query_vector(&self, query: &SearchQuery) -> SearchResult<Option<Vec<f32>>> {
        if let Some(embedding) = &query.embedding {
            self.check_dimension(embedding)?;
            return Ok(Some(embedding.clone()));
        }
        if let Some(path) = &query.image_path {
            return self.embed_image(path).await.map(Some);
        }
        if let Some(text) = query.text_query() {
            return self.embed_text(text).await.map(Some);
        }
        Ok(None)
    }

    pub async fn embed_text(&self, text: &str) -> SearchResult<Vec<f32>> {
        let vectors = self
            .embedder
            .embed(vec![text.to_string()])
            .await
            .map_err(|e| SearchError::Embedding(e.to_string()))?;
        let vector = first_vector(vectors)?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    pub async fn embed_image(&self, path: &Path) -> SearchResult<Vec<f32>> {
        let path = self.paths.check(path)?;
        if !path.is_file() {
            return Err(IndexingError::NotFound(path).into());
        }
        let image = load_for_model(&path, self.max_image_size)?;
        let vectors = self
            .embedder
            .embed_images(vec![image])
            .await
            .map_err(|e| SearchError::Embedding(e.to_string()))?;
        let vector = first_vector(vectors)?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    fn check_dimension(&self, vector: &[f32]) -> SearchResult<()> {
        let expected = self.store.dimension();
        if vector.len() != expected {
            return Err(SearchError::Embedding(format!(
                "dimension mismatch: expected {}, got {}",
                expected,
                vector.len()
            )));
        }
        Ok(())
    }

    /// 向量检索；带标签时先多取再过滤，保持原有排名
    async fn search_by_vector(
        &self,
        metric: DistanceMetric,
        vector: &[f32],
        tags: &[String],
        limit: usize,
    ) -> SearchResult<Vec<SearchHit>> {
        let fetch = if tags.is_empty() { limit } else { limit.saturating_mul(TAG_FILTER_OVERFETCH) };
        let records = self
            .store
            .search(metric, vector, fetch)
            .await
            .map_err(|e| SearchError::Store(e.to_string()))?;
        debug!("{} candidates from {}", records.len(), metric);

        let mut hits = Vec::with_capacity(records.len());
        for record in records {
            let hit = to_hit(record, metric)?;
            if tags.is_empty() || hit.payload.has_any_tag(tags) {
                hits.push(hit);
            }
        }
        hits.truncate(limit);
        Ok(hits)
    }

    /// 只按标签检索，分数为命中的标签占比
    async fn search_by_tags(&self, metric: DistanceMetric, tags: &[String], limit: usize) -> SearchResult<Vec<SearchHit>> {
        let records = self
            .store
            .find_by_tags(metric, tags, limit.saturating_mul(TAG_FILTER_OVERFETCH))
            .await
            .map_err(|e| SearchError::Store(e.to_string()))?;

        let mut hits = Vec::with_capacity(records.len());
        for record in records {
            let mut hit = to_hit(record, metric)?;
            hit.score = hit.payload.matched_tags(tags) as f32 / tags.len() as f32;
            hits.push(hit);
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

fn first_vector(vectors: Vec<Vec<f32>>) -> SearchResult<Vec<f32>> {
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| SearchError::Embedding("no embedding returned".to_string()))
}

fn to_hit(record: ScoredRecord, metric: DistanceMetric) -> SearchResult<SearchHit> {
    let payload = payload_from_scored(&record).map_err(|e| SearchError::Store(e.to_string()))?;
    Ok(SearchHit {
        id: record.id,
        score: record.score,
        metric,
        payload,
    })
}
