use anyhow::{anyhow, Result};
use async_openai::types::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs};
use async_trait::async_trait;
use tracing::debug;

use crate::llm::{ChatOptions, LlmClient};

/// Ollama 的 OpenAI 兼容接口
pub struct OllamaClient {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: "ollama".to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = api_key;
        self
    }

}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, messages: Vec<ChatCompletionRequestMessage>, options: ChatOptions) -> Result<String> {
        // 构建请求参数
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(messages)
            .max_tokens(options.max_tokens)
            .temperature(options.temperature)
            .build()?;

        let url = format!("{}/chat/completions", self.base_url);
        let response = self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("API request failed: {} - {}", status, error_text.trim()));
        }

        let response_text = response.text().await?;
        let response_json: serde_json::Value = serde_json::from_str(&response_text)?;

        // 提取返回的消息内容
        if let Some(content) = response_json["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .and_then(|choice| choice["message"]["content"].as_str())
        {
            debug!("{} replied with {} chars", self.model, content.len());
            return Ok(content.trim().to_string());
        }

        Err(anyhow!("Cannot extract message content from response: {}", response_text))
    }

    async fn health(&self) -> Result<String> {
        let url = format!("{}/models", self.base_url);
        let response = self.client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Connection failed: {}", response.status()));
        }

        let body: serde_json::Value = response.json().await?;
        let models: Vec<&str> = body["data"]
            .as_array()
            .map(|data| data.iter().filter_map(|m| m["id"].as_str()).collect())
            .unwrap_or_default();

        if models.contains(&self.model.as_str()) {
            Ok(format!("connected, model {} available", self.model))
        } else {
            Err(anyhow!("Model {} not available, {} models listed", self.model, models.len()))
        }
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
