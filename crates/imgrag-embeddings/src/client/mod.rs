pub mod clip;

use async_trait::async_trait;
use imgrag_indexing::EncodedImage;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid vector: {0}")]
    InvalidVector(String),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// 统一向量嵌入接口
///
/// 文本与图片可能由不同模型编码，两者不保证处于同一向量空间。
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// 批量嵌入文本
    async fn embed(&self, texts: Vec<String>) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// 批量嵌入图片
    async fn embed_images(&self, images: Vec<EncodedImage>) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// 获取向量维度
    fn dimension(&self) -> usize;

    /// 图片模型名称
    fn model_name(&self) -> String;
}

/// L2 归一化，将向量投影到单位球面上
pub fn normalize_embedding(embedding: &mut [f32]) -> EmbeddingResult<()> {
    if embedding.is_empty() {
        return Err(EmbeddingError::InvalidVector("Empty embedding vector".to_string()));
    }

    let norm = embedding
        .iter()
        .map(|&x| (x as f64).powi(2))
        .sum::<f64>()
        .sqrt() as f32;

    if norm.abs() < 1e-8 {
        return Err(EmbeddingError::InvalidVector("Zero vector cannot be normalized".to_string()));
    }

    for value in embedding.iter_mut() {
        *value /= norm;
    }
    Ok(())
}

/// 检查 L2 范数是否接近 1.0（容差 1e-6）
pub fn is_normalized(embedding: &[f32]) -> bool {
    if embedding.is_empty() {
        return false;
    }
    let norm = embedding.iter().map(|&x| (x as f64).powi(2)).sum::<f64>().sqrt();
    (norm - 1.0).abs() < 1e-6
}
