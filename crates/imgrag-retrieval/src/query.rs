use std::path::PathBuf;

use imgrag_embeddings::DistanceMetric;
use imgrag_indexing::ImagePayload;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: usize = 10;

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// 检索请求，至少提供一项；向量来源优先级：embedding > image_path > text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_path: Option<PathBuf>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            limit: DEFAULT_LIMIT,
            ..Default::default()
        }
    }

    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: Some(path.into()),
            limit: DEFAULT_LIMIT,
            ..Default::default()
        }
    }

    pub fn embedding(embedding: Vec<f32>) -> Self {
        Self {
            embedding: Some(embedding),
            limit: DEFAULT_LIMIT,
            ..Default::default()
        }
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            limit: DEFAULT_LIMIT,
            ..Default::default()
        }
        .with_tags(tags)
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// 去掉空白后非空的文本
    pub fn text_query(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// 规范化后的标签：去空白、小写、去空、去重
    pub fn normalized_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in &self.tags {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    pub fn has_vector_source(&self) -> bool {
        self.embedding.is_some() || self.image_path.is_some() || self.text_query().is_some()
    }

    /// 用于响应中回显的查询描述
    pub fn describe(&self) -> String {
        if self.embedding.is_some() {
            "embedding".to_string()
        } else if let Some(path) = &self.image_path {
            format!("image: {}", path.display())
        } else if let Some(text) = self.text_query() {
            text.to_string()
        } else {
            format!("tags: {}", self.normalized_tags().join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metric: DistanceMetric,
    pub payload: ImagePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub metric: DistanceMetric,
    pub limit: usize,
    pub total_found: usize,
    pub results: Vec<SearchHit>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let query: SearchQuery = serde_json::from_str(r#"{"text": "sunset"}"#).unwrap();
        assert_eq!(query.limit, 10);
        assert_eq!(query.metric, DistanceMetric::Cosine);
        assert!(query.tags.is_empty());

        let query: SearchQuery =
            serde_json::from_str(r#"{"tags": [" Snow ", "snow", ""], "metric": "euclid", "limit": 3}"#).unwrap();
        assert_eq!(query.normalized_tags(), vec!["snow"]);
        assert_eq!(query.metric, DistanceMetric::Euclid);
        assert!(!query.has_vector_source());
    }

    #[test]
    fn test_blank_text_is_not_a_query() {
        let query = SearchQuery::text("   ");
        assert!(query.text_query().is_none());
        assert!(!query.has_vector_source());
    }

    #[test]
    fn test_describe_follows_precedence() {
        let query = SearchQuery::text("lake").with_tags(["a"]);
        assert_eq!(query.describe(), "lake");
        let mut query = query;
        query.embedding = Some(vec![1.0]);
        assert_eq!(query.describe(), "embedding");
        assert_eq!(SearchQuery::tags(["Snow"]).describe(), "tags: snow");
    }
}
