use anyhow::{Context, Result};
use imgrag_indexing::{ImagePayload, ImageRecord};
use tracing::debug;

use crate::database::{ScoredRecord, VectorRecord, VectorStore};

// 图片记录转为向量数据库中的记录，point id 即 image_id
pub fn record_to_vector_record(record: &ImageRecord) -> Result<VectorRecord> {
    Ok(VectorRecord {
        id: record.id().to_string(),
        embedding: record.embedding.clone(),
        payload: serde_json::to_value(&record.payload).context("Failed to serialize image payload")?,
    })
}

/// 从库中取回的 payload 还原为 `ImagePayload`
pub fn payload_from_scored(hit: &ScoredRecord) -> Result<ImagePayload> {
    serde_json::from_value(hit.payload.clone())
        .with_context(|| format!("Invalid payload for point {}", hit.id))
}

pub fn vector_record_to_image_record(vec: VectorRecord) -> Result<ImageRecord> {
    let payload: ImagePayload = serde_json::from_value(vec.payload)
        .with_context(|| format!("Invalid payload for point {}", vec.id))?;
    Ok(ImageRecord {
        payload,
        embedding: vec.embedding,
    })
}

/// 写入所有度量对应的集合
pub async fn save_image_record(store: &dyn VectorStore, record: &ImageRecord) -> Result<()> {
    let vec = record_to_vector_record(record)?;
    store.upsert_vectors(vec![vec]).await?;
    debug!("Saved image record {} ({})", record.id(), record.payload.file_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DistanceMetric;
    use crate::database::memory::InMemoryStore;
    use imgrag_indexing::ImageInfo;
    use std::path::PathBuf;

    fn record(embedding: Vec<f32>, tags: &[&str]) -> ImageRecord {
        let info = ImageInfo {
            path: PathBuf::from("/data/photos/a.jpg"),
            file_name: "a.jpg".to_string(),
            file_size: 1024,
            width: 64,
            height: 48,
            format: "JPEG".to_string(),
        };
        ImageRecord::new(
            &info,
            None,
            None,
            tags.iter().map(|t| t.to_string()).collect(),
            "a photo".to_string(),
            "clip".to_string(),
            embedding,
        )
    }

    #[tokio::test]
    async fn test_save_and_find_round_trip() -> Result<()> {
        let store = InMemoryStore::new("image_db", 3);
        let saved = record(vec![0.0, 0.6, 0.8], &["snow"]);
        save_image_record(&store, &saved).await?;
        save_image_record(&store, &record(vec![1.0, 0.0, 0.0], &["beach"])).await?;

        let cosine = store.search(DistanceMetric::Cosine, &[0.0, 0.6, 0.8], 1).await?;
        assert_eq!(cosine[0].id, saved.id());
        assert!((cosine[0].score - 1.0).abs() < 1e-5);
        assert_eq!(payload_from_scored(&cosine[0])?, saved.payload);

        let euclid = store.search(DistanceMetric::Euclid, &[0.0, 0.6, 0.8], 1).await?;
        assert_eq!(euclid[0].id, saved.id());
        assert!(euclid[0].score.abs() < 1e-6);

        let fetched = store
            .get_vector(DistanceMetric::Manhattan, saved.id())
            .await?
            .map(vector_record_to_image_record)
            .transpose()?;
        assert_eq!(fetched, Some(saved));
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_rejected() {
        let store = InMemoryStore::new("image_db", 512);
        let result = save_image_record(&store, &record(vec![1.0, 0.0], &[])).await;
        assert!(result.is_err());
    }
}
