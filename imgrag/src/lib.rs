//! 图片打标签、描述与多度量向量检索

pub mod bulk;
pub mod cli;
pub mod config;
pub mod error;
pub mod geo;
pub mod llm;
pub mod pipeline;
pub mod server;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use imgrag_embeddings::database::memory::InMemoryStore;
use imgrag_embeddings::database::pgvector::PgVectorStore;
use imgrag_embeddings::database::qdrant::QdrantStore;
use imgrag_embeddings::{ClipEmbeddingClient, VectorStore};
use imgrag_indexing::PathValidator;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::{Config, StoreBackend};
use crate::geo::{NominatimGeocoder, ReverseGeocoder};
use crate::llm::OllamaClient;
use crate::pipeline::ImagePipeline;

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store = &config.store;
    let dimension = config.embedding.dimension;
    let store: Arc<dyn VectorStore> = match store.backend {
        StoreBackend::Qdrant => Arc::new(
            QdrantStore::new(
                &store.qdrant_url(),
                &store.collection_name,
                dimension,
                Duration::from_secs(store.qdrant_timeout),
            )?
            .with_api_key(store.qdrant_api_key.clone()),
        ),
        StoreBackend::Pgvector => {
            let url = store
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the pgvector store")?;
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .context("Failed to connect to Postgres")?;
            Arc::new(PgVectorStore::new(pool, &store.collection_name, dimension).await?)
        }
        StoreBackend::Memory => Arc::new(InMemoryStore::new(&store.collection_name, dimension)),
    };
    Ok(store)
}

/// 按配置组装各个服务并创建缺失的集合
pub async fn build_pipeline(config: &Config) -> anyhow::Result<ImagePipeline> {
    let store = build_store(config).await?;

    let embedder = ClipEmbeddingClient::new(
        config.embedding.base_url.clone(),
        config.embedding.image_model.clone(),
        config.embedding.dimension,
    )
    .with_text_model(config.embedding.text_model.clone())
    .with_api_key(config.embedding.api_key.clone());

    let llm = OllamaClient::new(config.llm.base_url.clone(), config.llm.model.clone())
        .with_api_key(config.llm.api_key.clone());

    let geocoder: Option<Arc<dyn ReverseGeocoder>> = if config.geocoder.enabled {
        Some(Arc::new(NominatimGeocoder::new(
            &config.geocoder.base_url,
            &config.geocoder.user_agent,
        )?))
    } else {
        None
    };

    let pipeline = ImagePipeline::new(
        Arc::new(llm),
        Arc::new(embedder),
        store,
        PathValidator::new(config.processing.allowed_paths.clone()),
        config.pipeline_settings(),
    )
    .with_geocoder(geocoder);

    pipeline.initialize().await?;
    info!(
        "Pipeline ready: {:?} store, model {}, allowed paths {:?}",
        config.store.backend,
        config.llm.model,
        config.processing.allowed_paths
    );
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn test_build_memory_pipeline() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = Config::default();
        config.store.backend = StoreBackend::Memory;
        config.embedding.dimension = 8;
        config.geocoder.enabled = false;
        config.processing.allowed_paths = vec![dir.path().to_path_buf()];

        let pipeline = build_pipeline(&config).await?;
        let info = pipeline.system_info();
        assert_eq!(info.embedding_dim, 8);
        assert_eq!(info.llm_model, "mistral-small3.2:latest");
        assert!(!info.geocoder_enabled);
        assert_eq!(info.allowed_paths, vec![dir.path().to_path_buf()]);
        assert_eq!(pipeline.collections().await?.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_pgvector_requires_url() {
        let mut config = Config::default();
        config.store.backend = StoreBackend::Pgvector;
        config.store.database_url = None;
        let err = build_pipeline(&config).await.err().expect("missing url");
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
