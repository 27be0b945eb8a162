use crate::client::{EmbeddingClient, EmbeddingError, EmbeddingResult, normalize_embedding};
use async_trait::async_trait;
use imgrag_indexing::EncodedImage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    encoding_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    modality: Option<&'static str>,
}

#[derive(Deserialize, Debug)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingItem>,
}

#[derive(Deserialize, Debug)]
struct OpenAIEmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorResponse {
    error: ApiErrorBody,
}

/// OpenAI 兼容 `/embeddings` 接口上的 CLIP 模型
///
/// 图片以 data URL 形式放在 `input` 里并带上 `modality: "image"`。
pub struct ClipEmbeddingClient {
    base_url: String,
    api_key: Option<String>,
    image_model: String,
    text_model: String,
    client: Client,
    dimension: usize,
}

impl ClipEmbeddingClient {
    pub fn new(base_url: impl Into<String>, image_model: impl Into<String>, dimension: usize) -> Self {
        let image_model = image_model.into();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            text_model: image_model.clone(),
            image_model,
            client: Client::new(),
            dimension,
        }
    }

    pub fn with_text_model(mut self, text_model: impl Into<String>) -> Self {
        self.text_model = text_model.into();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    async fn request(
        &self,
        model: &str,
        input: Vec<String>,
        modality: &'static str,
    ) -> EmbeddingResult<Vec<Vec<f32>>> {
        if input.is_empty() {
            return Err(EmbeddingError::Api("Input cannot be empty".to_string()));
        }
        let expected = input.len();

        let request = EmbeddingRequest {
            model,
            input,
            encoding_format: "float",
            modality: Some(modality),
        };

        let url = format!("{}/embeddings", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(|e| EmbeddingError::Network(e.to_string()))?;

        if !status.is_success() {
            if let Ok(err_resp) = serde_json::from_str::<ErrorResponse>(&resp_text) {
                let msg = err_resp.error.message.unwrap_or("Unknown error".to_string());
                let code = err_resp.error.code.map(|c| c.to_string()).unwrap_or_default();
                return Err(EmbeddingError::Api(format!("[{}] {}", code, msg)));
            } else {
                return Err(EmbeddingError::Api(format!("HTTP {}: {}", status, resp_text.trim())));
            }
        }

        let openai_resp: OpenAIEmbeddingResponse = serde_json::from_str(&resp_text)
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if openai_resp.data.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                openai_resp.data.len()
            )));
        }

        let mut items = openai_resp.data;
        items.sort_by_key(|item| item.index);

        let mut vectors = Vec::with_capacity(items.len());
        for item in items {
            let mut embedding = item.embedding;
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::InvalidVector(format!(
                    "dimension mismatch: expected {}, got {}",
                    self.dimension,
                    embedding.len()
                )));
            }
            normalize_embedding(&mut embedding)?;
            vectors.push(embedding);
        }

        debug!("{} {} embeddings from {}", vectors.len(), modality, model);
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingClient for ClipEmbeddingClient {
    async fn embed(&self, texts: Vec<String>) -> EmbeddingResult<Vec<Vec<f32>>> {
        self.request(&self.text_model, texts, "text").await
    }

    async fn embed_images(&self, images: Vec<EncodedImage>) -> EmbeddingResult<Vec<Vec<f32>>> {
        let input = images.iter().map(EncodedImage::data_url).collect();
        self.request(&self.image_model, input, "image").await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> String {
        self.image_model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::is_normalized;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// 按倒序返回，第 i 个输入的向量为 e_i（图片为 e_{i+1}），维度 4
    async fn fake_embeddings(Json(body): Json<Value>) -> Json<Value> {
        let offset = if body["modality"] == "image" { 1 } else { 0 };
        let inputs = body["input"].as_array().cloned().unwrap_or_default();
        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(i, _)| {
                let mut v = vec![0.0f32; 4];
                v[(i + offset) % 4] = 2.0;
                json!({"index": i, "embedding": v})
            })
            .collect();
        Json(json!({"data": data, "model": body["model"]}))
    }

    #[tokio::test]
    async fn test_embed_text_sorted_and_normalized() {
        let base = serve(Router::new().route("/embeddings", post(fake_embeddings))).await;
        let client = ClipEmbeddingClient::new(base, "clip", 4);

        let vectors = client.embed(vec!["a".into(), "b".into()]).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0, 0.0, 0.0]);
        assert!(vectors.iter().all(|v| is_normalized(v)));
    }

    #[tokio::test]
    async fn test_embed_images_uses_image_modality() {
        let base = serve(Router::new().route("/embeddings", post(fake_embeddings))).await;
        let client = ClipEmbeddingClient::new(base, "clip", 4).with_text_model("text-clip");

        let image = EncodedImage { bytes: vec![1, 2, 3], mime: "image/png" };
        let vectors = client.embed_images(vec![image]).await.unwrap();
        assert_eq!(vectors, vec![vec![0.0, 1.0, 0.0, 0.0]]);
        assert_eq!(client.model_name(), "clip");
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let base = serve(Router::new().route("/embeddings", post(fake_embeddings))).await;
        let client = ClipEmbeddingClient::new(base, "clip", 512);

        let result = client.embed(vec!["a".into()]).await;
        assert!(matches!(result, Err(EmbeddingError::InvalidVector(_))));
    }

    #[tokio::test]
    async fn test_api_error() {
        let router = Router::new().route(
            "/embeddings",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": {"code": 400, "message": "model not found"}})),
                )
            }),
        );
        let base = serve(router).await;
        let client = ClipEmbeddingClient::new(base, "missing", 4);

        match client.embed(vec!["a".into()]).await {
            Err(EmbeddingError::Api(msg)) => assert_eq!(msg, "[400] model not found"),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_input() {
        let client = ClipEmbeddingClient::new("http://127.0.0.1:9", "clip", 4);
        let result = client.embed(vec![]).await;
        if let Err(EmbeddingError::Api(msg)) = result {
            assert_eq!(msg, "Input cannot be empty");
        } else {
            panic!("Expected Api error for empty input");
        }
    }
}
