use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IndexingError, IndexingResult};

/// 图片文件的基础信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// 只读取文件头获取尺寸与格式，不解码像素
pub fn read_image_info(path: &Path) -> IndexingResult<ImageInfo> {
    let file_size = std::fs::metadata(path)?.len();

    let reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(|e| IndexingError::Read(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| IndexingError::Read(format!("cannot identify image file {}", path.display())))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| IndexingError::Read(e.to_string()))?;

    Ok(ImageInfo {
        path: path.to_path_buf(),
        file_name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size,
        width,
        height,
        format: format_name(format),
    })
}

pub fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Gif => "GIF".to_string(),
        ImageFormat::Bmp => "BMP".to_string(),
        ImageFormat::Tiff => "TIFF".to_string(),
        ImageFormat::WebP => "WEBP".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

/// 发送给模型的图片数据
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl EncodedImage {
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64())
    }
}

/// 读取图片供模型使用
///
/// 宽高都不超过 `max_dimension` 时原样返回文件内容；否则按比例缩小并重新编码为 JPEG。
pub fn load_for_model(path: &Path, max_dimension: u32) -> IndexingResult<EncodedImage> {
    let bytes = std::fs::read(path)?;
    let format = image::guess_format(&bytes).map_err(|e| IndexingError::Read(e.to_string()))?;

    let image = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| IndexingError::Read(e.to_string()))?;

    if max_dimension == 0 || (image.width() <= max_dimension && image.height() <= max_dimension) {
        return Ok(EncodedImage { bytes, mime: mime_type(format) });
    }

    debug!(
        "downscaling {} from {}x{} to fit {}",
        path.display(),
        image.width(),
        image.height(),
        max_dimension
    );
    let resized = image.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    encode_jpeg(resized)
}

fn encode_jpeg(image: DynamicImage) -> IndexingResult<EncodedImage> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(|e| IndexingError::Read(e.to_string()))?;
    Ok(EncodedImage { bytes: buf.into_inner(), mime: "image/jpeg" })
}

pub fn mime_type(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::WebP => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_read_image_info() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("wide.png");
        image::RgbImage::new(40, 20).save(&path)?;

        let info = read_image_info(&path)?;
        assert_eq!(info.width, 40);
        assert_eq!(info.height, 20);
        assert_eq!(info.format, "PNG");
        assert_eq!(info.file_name, "wide.png");
        assert_eq!(info.file_size, std::fs::metadata(&path)?.len());
        Ok(())
    }

    #[test]
    fn test_corrupt_file_is_read_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not an image")?;

        let err = read_image_info(&path).unwrap_err();
        assert!(matches!(err, IndexingError::Read(_)), "{err}");
        Ok(())
    }

    #[test]
    fn test_small_image_kept_as_is() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("small.png");
        image::RgbImage::new(16, 16).save(&path)?;

        let encoded = load_for_model(&path, 1024)?;
        assert_eq!(encoded.bytes, std::fs::read(&path)?);
        assert_eq!(encoded.mime, "image/png");
        assert!(encoded.data_url().starts_with("data:image/png;base64,"));
        Ok(())
    }

    #[test]
    fn test_large_image_downscaled() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("large.png");
        image::RgbaImage::new(200, 100).save(&path)?;

        let encoded = load_for_model(&path, 50)?;
        assert_eq!(encoded.mime, "image/jpeg");
        let decoded = image::load_from_memory(&encoded.bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (50, 25));
        Ok(())
    }
}
