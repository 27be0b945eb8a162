pub mod client;
pub mod ollama;
pub mod vision;

pub use client::{ChatOptions, LlmClient};
pub use ollama::OllamaClient;
pub use vision::{ImageAnalysis, VisionAnalyzer};
