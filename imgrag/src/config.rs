//! 配置：默认值 → 环境变量（含 `.env`）→ 命令行参数

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::ValueEnum;
use imgrag_indexing::PathValidator;
use imgrag_indexing::scan::DEFAULT_EXTENSIONS;
use serde::Serialize;

use crate::pipeline::PipelineSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Qdrant,
    Pgvector,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub qdrant_host: String,
    pub qdrant_port: u16,
    /// 秒
    pub qdrant_timeout: u64,
    #[serde(skip_serializing)]
    pub qdrant_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub database_url: Option<String>,
    pub collection_name: String,
}

impl StoreConfig {
    pub fn qdrant_url(&self) -> String {
        if self.qdrant_host.starts_with("http://") || self.qdrant_host.starts_with("https://") {
            format!("{}:{}", self.qdrant_host.trim_end_matches('/'), self.qdrant_port)
        } else {
            format!("http://{}:{}", self.qdrant_host, self.qdrant_port)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub max_tags: usize,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub image_model: String,
    pub text_model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeocoderConfig {
    pub enabled: bool,
    pub base_url: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingConfig {
    pub allowed_paths: Vec<PathBuf>,
    pub supported_extensions: Vec<String>,
    pub batch_size: usize,
    pub max_image_size: u32,
    pub write_file_metadata: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub store: StoreConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub geocoder: GeocoderConfig,
    pub server: ServerConfig,
    pub processing: ProcessingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let clip = "laion/clip-vit-b-32-laion2B-s34B-b79K".to_string();
        Self {
            store: StoreConfig {
                backend: StoreBackend::Qdrant,
                qdrant_host: "localhost".to_string(),
                qdrant_port: 6333,
                qdrant_timeout: 120,
                qdrant_api_key: None,
                database_url: None,
                collection_name: "image_db".to_string(),
            },
            llm: LlmConfig {
                base_url: "http://localhost:11434/v1".to_string(),
                model: "mistral-small3.2:latest".to_string(),
                api_key: "ollama".to_string(),
                max_tags: 10,
                language: "English".to_string(),
            },
            embedding: EmbeddingConfig {
                base_url: "http://localhost:7997".to_string(),
                image_model: clip.clone(),
                text_model: clip,
                api_key: None,
                dimension: 512,
            },
            geocoder: GeocoderConfig {
                enabled: true,
                base_url: "https://nominatim.openstreetmap.org".to_string(),
                user_agent: "imgrag/0.1".to_string(),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 7860,
            },
            processing: ProcessingConfig {
                allowed_paths: PathValidator::default_roots(),
                supported_extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
                batch_size: 10,
                max_image_size: 1024,
                write_file_metadata: true,
            },
        }
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("Invalid value for {}: {:?}", name, value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("Invalid value for {}: {:?}", name, value),
    }
}

/// `:` 分隔的路径列表
pub fn split_paths(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取，未设置或为空的键保持默认值
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(v) = get("VECTOR_STORE") {
            config.store.backend = parse("VECTOR_STORE", &v)?;
        }
        if let Some(v) = get("QDRANT_HOST") {
            config.store.qdrant_host = v;
        }
        if let Some(v) = get("QDRANT_PORT") {
            config.store.qdrant_port = parse("QDRANT_PORT", &v)?;
        }
        if let Some(v) = get("QDRANT_TIMEOUT") {
            config.store.qdrant_timeout = parse("QDRANT_TIMEOUT", &v)?;
        }
        config.store.qdrant_api_key = get("QDRANT_API_KEY");
        config.store.database_url = get("DATABASE_URL");
        if let Some(v) = get("COLLECTION_NAME") {
            config.store.collection_name = v;
        }

        if let Some(v) = get("OLLAMA_BASE_URL") {
            config.llm.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            config.llm.model = v;
        }
        if let Some(v) = get("OLLAMA_API_KEY") {
            config.llm.api_key = v;
        }
        if let Some(v) = get("MAX_TAGS") {
            config.llm.max_tags = parse("MAX_TAGS", &v)?;
        }
        if let Some(v) = get("TAG_LANGUAGE") {
            config.llm.language = v;
        }

        if let Some(v) = get("EMBEDDING_BASE_URL") {
            config.embedding.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("CLIP_MODEL_NAME") {
            config.embedding.image_model = v.clone();
            config.embedding.text_model = v;
        }
        if let Some(v) = get("CLIP_TEXT_MODEL_NAME") {
            config.embedding.text_model = v;
        }
        config.embedding.api_key = get("EMBEDDING_API_KEY");
        if let Some(v) = get("EMBEDDING_DIM") {
            config.embedding.dimension = parse("EMBEDDING_DIM", &v)?;
        }

        if let Some(v) = get("GEOCODER_ENABLED") {
            config.geocoder.enabled = parse_bool("GEOCODER_ENABLED", &v)?;
        }
        if let Some(v) = get("GEOCODER_URL") {
            config.geocoder.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("GEOCODER_USER_AGENT") {
            config.geocoder.user_agent = v;
        }

        if let Some(v) = get("SERVER_NAME") {
            config.server.host = v;
        }
        if let Some(v) = get("SERVER_PORT") {
            config.server.port = parse("SERVER_PORT", &v)?;
        }

        if let Some(v) = get("ALLOWED_PATHS") {
            config.processing.allowed_paths = split_paths(&v);
        }
        if let Some(v) = get("SUPPORTED_EXTENSIONS") {
            config.processing.supported_extensions = v
                .split(',')
                .map(str::trim)
                .filter(|ext| !ext.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get("BATCH_SIZE") {
            config.processing.batch_size = parse("BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("MAX_IMAGE_SIZE") {
            config.processing.max_image_size = parse("MAX_IMAGE_SIZE", &v)?;
        }
        if let Some(v) = get("WRITE_FILE_METADATA") {
            config.processing.write_file_metadata = parse_bool("WRITE_FILE_METADATA", &v)?;
        }

        Ok(config)
    }

    /// 返回所有问题，空表示配置可用
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.store.backend == StoreBackend::Qdrant {
            if self.store.qdrant_host.trim().is_empty() {
                errors.push("QDRANT_HOST is required".to_string());
            }
            if self.store.qdrant_port == 0 {
                errors.push("QDRANT_PORT must be a positive integer".to_string());
            }
        }
        if self.store.backend == StoreBackend::Pgvector && self.store.database_url.is_none() {
            errors.push("DATABASE_URL is required for the pgvector store".to_string());
        }
        if self.store.collection_name.trim().is_empty() {
            errors.push("COLLECTION_NAME is required".to_string());
        }

        if self.llm.model.trim().is_empty() {
            errors.push("OLLAMA_MODEL is required".to_string());
        }
        if self.llm.base_url.trim().is_empty() {
            errors.push("OLLAMA_BASE_URL is required".to_string());
        }

        if self.embedding.image_model.trim().is_empty() {
            errors.push("CLIP_MODEL_NAME is required".to_string());
        }
        if self.embedding.base_url.trim().is_empty() {
            errors.push("EMBEDDING_BASE_URL is required".to_string());
        }
        if self.embedding.dimension == 0 {
            errors.push("EMBEDDING_DIM must be a positive integer".to_string());
        }

        if self.server.host.trim().is_empty() {
            errors.push("SERVER_NAME is required".to_string());
        }
        if self.server.port == 0 {
            errors.push("SERVER_PORT must be a positive integer".to_string());
        }

        if self.processing.allowed_paths.is_empty() {
            errors.push("At least one allowed path is required".to_string());
        }
        for path in &self.processing.allowed_paths {
            if !path.exists() {
                errors.push(format!("Allowed path does not exist: {}", path.display()));
            }
        }
        if self.processing.supported_extensions.is_empty() {
            errors.push("At least one supported extension is required".to_string());
        }

        errors
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_tags: self.llm.max_tags,
            tag_language: self.llm.language.clone(),
            max_image_size: self.processing.max_image_size,
            batch_size: self.processing.batch_size,
            write_file_metadata: self.processing.write_file_metadata,
            supported_extensions: self.processing.supported_extensions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let config = from_pairs(&[])?;
        assert_eq!(config.store.backend, StoreBackend::Qdrant);
        assert_eq!(config.store.qdrant_url(), "http://localhost:6333");
        assert_eq!(config.store.collection_name, "image_db");
        assert_eq!(config.llm.model, "mistral-small3.2:latest");
        assert_eq!(config.embedding.dimension, 512);
        assert_eq!(config.embedding.text_model, config.embedding.image_model);
        assert_eq!(config.server.port, 7860);
        assert_eq!(config.processing.supported_extensions.len(), 7);

        let dir = tempfile::tempdir()?;
        let mut config = config;
        config.processing.allowed_paths = vec![dir.path().to_path_buf()];
        assert!(config.validate().is_empty(), "{:?}", config.validate());
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let config = from_pairs(&[
            ("VECTOR_STORE", "Memory"),
            ("QDRANT_PORT", "7000"),
            ("OLLAMA_BASE_URL", "http://gpu:11434/v1/"),
            ("CLIP_MODEL_NAME", "clip-large"),
            ("CLIP_TEXT_MODEL_NAME", "clip-text"),
            ("ALLOWED_PATHS", "/tmp: /var/tmp :"),
            ("SUPPORTED_EXTENSIONS", ".jpg, png"),
            ("GEOCODER_ENABLED", "off"),
            ("BATCH_SIZE", ""),
        ])?;
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.qdrant_port, 7000);
        assert_eq!(config.llm.base_url, "http://gpu:11434/v1");
        assert_eq!(config.embedding.image_model, "clip-large");
        assert_eq!(config.embedding.text_model, "clip-text");
        assert_eq!(
            config.processing.allowed_paths,
            vec![PathBuf::from("/tmp"), PathBuf::from("/var/tmp")]
        );
        assert_eq!(config.processing.supported_extensions, vec![".jpg", "png"]);
        assert!(!config.geocoder.enabled);
        assert_eq!(config.processing.batch_size, 10);
        Ok(())
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        let err = from_pairs(&[("SERVER_PORT", "seventy")]).unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
        assert!(from_pairs(&[("VECTOR_STORE", "redis")]).is_err());
        assert!(from_pairs(&[("WRITE_FILE_METADATA", "maybe")]).is_err());
    }

    #[test]
    fn test_validate_reports_problems() -> Result<()> {
        let mut config = from_pairs(&[("VECTOR_STORE", "pgvector")])?;
        config.llm.model.clear();
        config.embedding.dimension = 0;
        config.processing.allowed_paths = vec![PathBuf::from("/definitely/not/here")];

        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("DATABASE_URL")));
        assert!(errors.iter().any(|e| e.contains("OLLAMA_MODEL")));
        assert!(errors.iter().any(|e| e.contains("EMBEDDING_DIM")));
        assert!(errors.iter().any(|e| e.contains("/definitely/not/here")));
        Ok(())
    }

    #[test]
    fn test_secrets_are_not_serialized() -> Result<()> {
        let config = from_pairs(&[("QDRANT_API_KEY", "s3cret"), ("OLLAMA_API_KEY", "k3y")])?;
        let json = serde_json::to_string(&config)?;
        assert!(!json.contains("s3cret"));
        assert!(!json.contains("k3y"));
        Ok(())
    }
}
