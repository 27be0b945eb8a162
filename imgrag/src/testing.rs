//! 测试用的假服务与图片生成

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_openai::types::ChatCompletionRequestMessage;
use async_trait::async_trait;
use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};
use imgrag_embeddings::database::memory::InMemoryStore;
use imgrag_embeddings::{EmbeddingClient, EmbeddingError, EmbeddingResult};
use imgrag_indexing::{EncodedImage, GpsCoordinates, PathValidator};

use crate::geo::ReverseGeocoder;
use crate::llm::{ChatOptions, LlmClient};
use crate::pipeline::{ImagePipeline, PipelineSettings};

/// 标签请求（temperature 0.3）回 JSON 数组，其余回固定描述
#[derive(Default)]
pub struct FakeLlm {
    fail: bool,
}

impl FakeLlm {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn generate(&self, _messages: Vec<ChatCompletionRequestMessage>, options: ChatOptions) -> Result<String> {
        if self.fail {
            return Err(anyhow!("API request failed: 500 - model crashed"));
        }
        if options.temperature < 0.5 {
            Ok(r#"["Mountain", "snow"]"#.to_string())
        } else {
            Ok("A snowy mountain under a clear sky.".to_string())
        }
    }

    async fn health(&self) -> Result<String> {
        if self.fail {
            Err(anyhow!("Connection failed: 503"))
        } else {
            Ok("connected".to_string())
        }
    }

    fn model_name(&self) -> String {
        "fake-vlm".to_string()
    }
}

/// 图片按字节数映射到某个坐标轴上的单位向量；文本 "mountain" 为 e_0，其余为 e_last
pub struct FakeEmbedder {
    dimension: usize,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn axis(&self, index: usize) -> Vec<f32> {
        let mut v = vec![0.0; self.dimension];
        v[index % self.dimension] = 1.0;
        v
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbedder {
    async fn embed(&self, texts: Vec<String>) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(EmbeddingError::Api("Input cannot be empty".to_string()));
        }
        Ok(texts
            .iter()
            .map(|t| if t == "mountain" { self.axis(0) } else { self.axis(self.dimension - 1) })
            .collect())
    }

    async fn embed_images(&self, images: Vec<EncodedImage>) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(images.iter().map(|image| self.axis(image.bytes.len())).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> String {
        "fake-clip".to_string()
    }
}

pub struct FakeGeocoder;

#[async_trait]
impl ReverseGeocoder for FakeGeocoder {
    async fn reverse(&self, coords: GpsCoordinates) -> Result<Option<String>> {
        Ok(Some(format!("somewhere near {}", coords.latitude)))
    }
}

/// 服务不可用
pub struct FailingGeocoder;

#[async_trait]
impl ReverseGeocoder for FailingGeocoder {
    async fn reverse(&self, _coords: GpsCoordinates) -> Result<Option<String>> {
        Err(anyhow!("Geocoding request failed: 503"))
    }
}

/// 允许访问 `root` 的内存版流程，向量维度 4
pub fn pipeline_in(root: &Path) -> ImagePipeline {
    ImagePipeline::new(
        Arc::new(FakeLlm::default()),
        Arc::new(FakeEmbedder::new(4)),
        Arc::new(InMemoryStore::new("image_db", 4)),
        PathValidator::new([root]),
        PipelineSettings::default(),
    )
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    image::RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 128]))
        .save(path)
        .unwrap();
}

fn dms(value: f64) -> Vec<Rational> {
    let degrees = value.trunc();
    let minutes = ((value - degrees) * 60.0).trunc();
    let seconds = ((value - degrees) * 60.0 - minutes) * 60.0;
    vec![
        Rational { num: degrees as u32, denom: 1 },
        Rational { num: minutes as u32, denom: 1 },
        Rational { num: (seconds * 1000.0).round() as u32, denom: 1000 },
    ]
}

/// 北纬 / 东经坐标的 JPEG
pub fn write_jpeg_with_gps(path: &Path, latitude: f64, longitude: f64) {
    let fields = [
        Field { tag: Tag::GPSLatitudeRef, ifd_num: In::PRIMARY, value: Value::Ascii(vec![b"N".to_vec()]) },
        Field { tag: Tag::GPSLatitude, ifd_num: In::PRIMARY, value: Value::Rational(dms(latitude)) },
        Field { tag: Tag::GPSLongitudeRef, ifd_num: In::PRIMARY, value: Value::Ascii(vec![b"E".to_vec()]) },
        Field { tag: Tag::GPSLongitude, ifd_num: In::PRIMARY, value: Value::Rational(dms(longitude)) },
    ];
    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();

    let mut encoded = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(16, 16, image::Rgb([200, 210, 220]))
        .write_to(&mut encoded, image::ImageFormat::Jpeg)
        .unwrap();
    let mut jpeg = Jpeg::from_bytes(Bytes::from(encoded.into_inner())).unwrap();
    jpeg.set_exif(Some(Bytes::from(tiff.into_inner())));
    std::fs::write(path, jpeg.encoder().bytes()).unwrap();
}
