use std::sync::Arc;

use anyhow::{Result, bail};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContentPart, ImageDetail, ImageUrlArgs,
};
use imgrag_indexing::EncodedImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::llm::{ChatOptions, LlmClient};

const TAGS_OPTIONS: ChatOptions = ChatOptions { max_tokens: 500, temperature: 0.3 };
const DESCRIPTION_OPTIONS: ChatOptions = ChatOptions { max_tokens: 300, temperature: 0.7 };

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub tags: Vec<String>,
    pub description: String,
    pub model_used: String,
}

/// 让视觉语言模型为图片生成标签和描述
pub struct VisionAnalyzer {
    llm: Arc<dyn LlmClient>,
    max_tags: usize,
    language: String,
}

impl VisionAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>, max_tags: usize) -> Self {
        Self {
            llm,
            max_tags,
            language: "English".to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn tags_prompt(&self) -> String {
        format!(
            "Analyze the provided image and generate descriptive tags.\n\
             Create exactly {} tags that describe the image content.\n\
             Format the response as a JSON array of strings.\n\
             Write the tags in {}.\n\
             Example: [\"beach\", \"sunset\", \"ocean\", \"sky\", \"sand\", \"waves\", \"tropical\", \"landscape\", \"nature\", \"outdoors\"]",
            self.max_tags, self.language
        )
    }

    pub fn description_prompt(&self) -> String {
        format!(
            "Analyze the provided image and give a detailed description.\n\
             Describe the main subjects, the surroundings, colors, mood and any notable features.\n\
             Write one coherent paragraph of 3-5 sentences in {}.",
            self.language
        )
    }

    pub async fn generate_tags(&self, image: &EncodedImage) -> Result<Vec<String>> {
        let message = image_message(&self.tags_prompt(), image)?;
        let content = self.llm.generate(vec![message], TAGS_OPTIONS).await?;
        let tags = parse_tags(&content, self.max_tags)?;
        debug!("generated {} tags: {:?}", tags.len(), tags);
        Ok(tags)
    }

    pub async fn generate_description(&self, image: &EncodedImage) -> Result<String> {
        let message = image_message(&self.description_prompt(), image)?;
        let description = self.llm.generate(vec![message], DESCRIPTION_OPTIONS).await?;
        Ok(description.trim().to_string())
    }

    /// 先标签后描述，任一步失败即返回
    pub async fn analyze(&self, image: &EncodedImage) -> Result<ImageAnalysis> {
        let tags = self.generate_tags(image).await?;
        let description = self.generate_description(image).await?;
        Ok(ImageAnalysis {
            tags,
            description,
            model_used: self.llm.model_name(),
        })
    }
}

/// 一条用户消息：文本提示 + data URL 形式的图片
pub fn image_message(prompt: &str, image: &EncodedImage) -> Result<ChatCompletionRequestMessage> {
    let text: ChatCompletionRequestUserMessageContentPart = ChatCompletionRequestMessageContentPartTextArgs::default()
        .text(prompt)
        .build()?
        .into();
    let picture: ChatCompletionRequestUserMessageContentPart = ChatCompletionRequestMessageContentPartImageArgs::default()
        .image_url(
            ImageUrlArgs::default()
                .url(image.data_url())
                .detail(ImageDetail::Auto)
                .build()?,
        )
        .build()?
        .into();

    Ok(ChatCompletionRequestUserMessageArgs::default()
        .content(vec![text, picture])
        .build()?
        .into())
}

/// 解析模型返回的标签
///
/// 优先按 JSON 数组解析（允许包在 ``` 代码块里）；不是合法 JSON 时按行、按逗号拆分。
/// 合法 JSON 但不是数组视为失败。
pub fn parse_tags(content: &str, max_tags: usize) -> Result<Vec<String>> {
    let body = strip_code_fence(content);

    let raw: Vec<String> = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Ok(_) => bail!("Failed to parse tags from response"),
        Err(_) => body
            .lines()
            .map(|line| line.trim().trim_matches('-').trim_matches('*').trim())
            .filter(|line| !line.is_empty())
            .flat_map(|line| line.split(',').map(str::to_string).collect::<Vec<_>>())
            .collect(),
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.trim().to_lowercase();
        if tag.chars().count() > 1 && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags.truncate(max_tags);
    Ok(tags)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 去掉语言标记所在的首行
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn test_parse_json_array() {
        let tags = parse_tags(r#"["Beach", " Sunset ", "a", "beach", 42, "Ocean"]"#, 10).unwrap();
        assert_eq!(tags, vec!["beach", "sunset", "ocean"]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "```json\n[\"mountain\", \"snow\"]\n```";
        assert_eq!(parse_tags(content, 10).unwrap(), vec!["mountain", "snow"]);
    }

    #[test]
    fn test_parse_plain_text_fallback() {
        let content = "Here are tags:\n- Mountain\n* snow, ICE , x\nlake";
        let tags = parse_tags(content, 10).unwrap();
        assert_eq!(tags, vec!["here are tags:", "mountain", "snow", "ice", "lake"]);
    }

    #[test]
    fn test_parse_caps_and_rejects_non_array() {
        let tags = parse_tags(r#"["a1", "b2", "c3", "d4"]"#, 2).unwrap();
        assert_eq!(tags, vec!["a1", "b2"]);
        assert!(parse_tags(r#"{"tags": ["a1"]}"#, 10).is_err());
    }

    /// 记录每次调用的参数，按顺序返回预设回复
    struct ScriptedLlm {
        replies: Mutex<Vec<String>>,
        calls: Mutex<Vec<ChatOptions>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, messages: Vec<ChatCompletionRequestMessage>, options: ChatOptions) -> Result<String> {
            assert_eq!(messages.len(), 1);
            let json = serde_json::to_value(&messages[0])?;
            assert_eq!(json["role"], "user");
            assert_eq!(json["content"][0]["type"], "text");
            assert!(json["content"][1]["image_url"]["url"]
                .as_str()
                .unwrap_or_default()
                .starts_with("data:image/png;base64,"));

            self.calls.lock().unwrap().push(options);
            Ok(self.replies.lock().unwrap().remove(0))
        }

        async fn health(&self) -> Result<String> {
            Ok("ok".to_string())
        }

        fn model_name(&self) -> String {
            "scripted".to_string()
        }
    }

    #[tokio::test]
    async fn test_analyze_uses_two_calls() -> Result<()> {
        let llm = Arc::new(ScriptedLlm {
            replies: Mutex::new(vec![r#"["Lake", "forest"]"#.to_string(), " A calm lake. ".to_string()]),
            calls: Mutex::new(Vec::new()),
        });
        let analyzer = VisionAnalyzer::new(llm.clone(), 10).with_language("German");
        assert!(analyzer.tags_prompt().contains("in German"));

        let image = EncodedImage { bytes: vec![1, 2, 3], mime: "image/png" };
        let analysis = analyzer.analyze(&image).await?;

        assert_eq!(analysis.tags, vec!["lake", "forest"]);
        assert_eq!(analysis.description, "A calm lake.");
        assert_eq!(analysis.model_used, "scripted");
        assert_eq!(*llm.calls.lock().unwrap(), vec![TAGS_OPTIONS, DESCRIPTION_OPTIONS]);
        Ok(())
    }
}
