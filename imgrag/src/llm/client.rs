use async_openai::types::ChatCompletionRequestMessage;
use async_trait::async_trait;
use anyhow::Result;

/// 单次请求的生成参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatOptions {
    pub fn new(max_tokens: u32, temperature: f32) -> Self {
        Self { max_tokens, temperature }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, messages: Vec<ChatCompletionRequestMessage>, options: ChatOptions) -> Result<String>;

    /// 列出模型以确认服务可用
    async fn health(&self) -> Result<String>;

    fn model_name(&self) -> String;
}
