//! 把生成的描述与标签写回图片文件本身
//!
//! JPEG / WebP 写入 EXIF UserComment（保留已有的主 IFD 字段），PNG 写入 iTXt 文本块。
//! 其它格式返回 [`IndexingError::Metadata`]，由调用方决定是否忽略。

use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use exif::experimental::Writer;
use exif::{Field, In, Reader, Tag, Value};
use img_parts::png::{Png, PngChunk};
use img_parts::{Bytes, DynImage, ImageEXIF};
use tracing::{debug, warn};

use crate::error::{IndexingError, IndexingResult};
use crate::gps::GpsCoordinates;
use crate::record::ImagePayload;

/// 重写 EXIF 时由 Writer 重新生成或无法安全搬运的字段
const SKIPPED_TAGS: &[Tag] = &[
    Tag::ExifIFDPointer,
    Tag::GPSInfoIFDPointer,
    Tag::InteropIFDPointer,
    Tag::JPEGInterchangeFormat,
    Tag::JPEGInterchangeFormatLength,
    Tag::StripOffsets,
    Tag::StripByteCounts,
    Tag::TileOffsets,
    Tag::TileByteCounts,
    Tag::MakerNote,
    Tag::UserComment,
];

#[derive(Debug, Clone)]
pub struct EmbeddedMetadata {
    pub description: String,
    pub tags: Vec<String>,
    pub processed_at: DateTime<Utc>,
    pub gps: Option<GpsCoordinates>,
}

impl From<&ImagePayload> for EmbeddedMetadata {
    fn from(payload: &ImagePayload) -> Self {
        Self {
            description: payload.ai_description.clone(),
            tags: payload.ai_tags.clone(),
            processed_at: payload.processing_timestamp,
            gps: payload.gps_coordinates,
        }
    }
}

impl EmbeddedMetadata {
    /// 去重排序后用 `, ` 连接
    pub fn keywords(&self) -> String {
        let mut tags = self.tags.clone();
        tags.sort();
        tags.dedup();
        tags.join(", ")
    }

    pub fn comment(&self) -> String {
        let mut lines = vec![
            format!("AI Description: {}", self.description),
            format!("AI Tags: {}", self.keywords()),
            format!(
                "Processing Date: {}",
                self.processed_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        ];
        if let Some(gps) = self.gps {
            lines.push(format!("GPS Latitude: {}", gps.latitude));
            lines.push(format!("GPS Longitude: {}", gps.longitude));
        }
        lines.join("\n")
    }
}

pub fn write_metadata(path: &Path, metadata: &EmbeddedMetadata) -> IndexingResult<()> {
    let bytes = std::fs::read(path)?;
    let image = DynImage::from_bytes(Bytes::from(bytes))
        .map_err(|e| IndexingError::Metadata(e.to_string()))?
        .ok_or_else(|| {
            IndexingError::Metadata(format!("unsupported format for metadata writing: {}", path.display()))
        })?;

    let updated = match image {
        DynImage::Png(mut png) => {
            set_png_text(&mut png, "Keywords", &metadata.keywords());
            set_png_text(&mut png, "Description", &metadata.description);
            DynImage::Png(png)
        }
        mut other => {
            let exif = merged_exif(other.exif(), &metadata.comment())?;
            other.set_exif(Some(Bytes::from(exif)));
            other
        }
    };

    write_atomically(path, &updated.encoder().bytes())?;
    debug!("metadata written to {}", path.display());
    Ok(())
}

/// 读取 EXIF UserComment（去掉 8 字节字符集头）
pub fn read_user_comment(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let image = DynImage::from_bytes(Bytes::from(bytes)).ok()??;
    let exif = Reader::new().read_raw(image.exif()?.to_vec()).ok()?;
    let field = exif.get_field(Tag::UserComment, In::PRIMARY)?;
    match &field.value {
        Value::Undefined(raw, _) => decode_user_comment(raw, exif.little_endian()),
        _ => None,
    }
}

/// 读取 PNG 的 tEXt / iTXt 文本块
pub fn read_png_text(path: &Path, keyword: &str) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let png = Png::from_bytes(Bytes::from(bytes)).ok()?;
    png.chunks()
        .iter()
        .filter(|chunk| is_text_chunk(chunk.kind()) && chunk_keyword(chunk.contents()) == keyword.as_bytes())
        .find_map(|chunk| text_chunk_value(chunk.kind(), chunk.contents()))
}

fn merged_exif(existing: Option<Bytes>, comment: &str) -> IndexingResult<Vec<u8>> {
    let (fields, little_endian) = match existing {
        Some(raw) => match Reader::new().read_raw(raw.to_vec()) {
            Ok(exif) => (
                exif.fields()
                    .filter(|field| field.ifd_num == In::PRIMARY && !SKIPPED_TAGS.contains(&field.tag))
                    .cloned()
                    .collect::<Vec<Field>>(),
                exif.little_endian(),
            ),
            Err(e) => {
                warn!("existing EXIF unreadable, writing a fresh one: {}", e);
                (Vec::new(), false)
            }
        },
        None => (Vec::new(), false),
    };

    let user_comment = Field {
        tag: Tag::UserComment,
        ifd_num: In::PRIMARY,
        value: Value::Undefined(encode_user_comment(comment, little_endian), 0),
    };

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    writer.push_field(&user_comment);

    let mut buf = Cursor::new(Vec::new());
    writer
        .write(&mut buf, little_endian)
        .map_err(|e| IndexingError::Metadata(format!("Failed to write EXIF tags: {}", e)))?;
    Ok(buf.into_inner())
}

fn encode_user_comment(text: &str, little_endian: bool) -> Vec<u8> {
    if text.is_ascii() {
        let mut out = b"ASCII\0\0\0".to_vec();
        out.extend_from_slice(text.as_bytes());
        return out;
    }

    let mut out = b"UNICODE\0".to_vec();
    for unit in text.encode_utf16() {
        let bytes = if little_endian { unit.to_le_bytes() } else { unit.to_be_bytes() };
        out.extend_from_slice(&bytes);
    }
    out
}

fn decode_user_comment(raw: &[u8], little_endian: bool) -> Option<String> {
    if raw.len() < 8 {
        return None;
    }
    let (header, body) = raw.split_at(8);
    match header {
        b"UNICODE\0" => {
            let units: Vec<u16> = body
                .chunks_exact(2)
                .map(|pair| {
                    let pair = [pair[0], pair[1]];
                    if little_endian { u16::from_le_bytes(pair) } else { u16::from_be_bytes(pair) }
                })
                .collect();
            String::from_utf16(&units).ok()
        }
        _ => Some(String::from_utf8_lossy(body).trim_end_matches('\0').to_string()),
    }
}

fn set_png_text(png: &mut Png, keyword: &str, text: &str) {
    let chunks = png.chunks_mut();
    chunks.retain(|chunk| !(is_text_chunk(chunk.kind()) && chunk_keyword(chunk.contents()) == keyword.as_bytes()));
    let iend = chunks
        .iter()
        .position(|chunk| chunk.kind() == *b"IEND")
        .unwrap_or(chunks.len());
    chunks.insert(iend, itxt_chunk(keyword, text));
}

/// iTXt: keyword \0 压缩标志 压缩方式 语言 \0 翻译关键字 \0 UTF-8 文本
fn itxt_chunk(keyword: &str, text: &str) -> PngChunk {
    let mut data = Vec::with_capacity(keyword.len() * 2 + text.len() + 8);
    data.extend_from_slice(keyword.as_bytes());
    data.extend_from_slice(&[0, 0, 0]);
    data.extend_from_slice(b"en\0");
    data.extend_from_slice(keyword.as_bytes());
    data.push(0);
    data.extend_from_slice(text.as_bytes());
    PngChunk::new(*b"iTXt", Bytes::from(data))
}

fn is_text_chunk(kind: [u8; 4]) -> bool {
    matches!(&kind, b"tEXt" | b"iTXt" | b"zTXt")
}

fn chunk_keyword(contents: &[u8]) -> &[u8] {
    let end = contents.iter().position(|b| *b == 0).unwrap_or(contents.len());
    &contents[..end]
}

fn text_chunk_value(kind: [u8; 4], contents: &[u8]) -> Option<String> {
    let rest = contents.get(chunk_keyword(contents).len() + 1..)?;
    match &kind {
        b"tEXt" => Some(String::from_utf8_lossy(rest).into_owned()),
        b"iTXt" => {
            // 跳过压缩标志、压缩方式、语言、翻译关键字
            if rest.len() < 2 || rest[0] != 0 {
                return None;
            }
            let rest = &rest[2..];
            let lang_end = rest.iter().position(|b| *b == 0)?;
            let rest = &rest[lang_end + 1..];
            let keyword_end = rest.iter().position(|b| *b == 0)?;
            Some(String::from_utf8_lossy(&rest[keyword_end + 1..]).into_owned())
        }
        _ => None,
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> IndexingResult<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.imgrag-tmp", file_name));
    std::fs::write(&tmp, bytes)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
