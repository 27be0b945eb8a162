use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gps::GpsCoordinates;
use crate::image_file::ImageInfo;

/// 向量库中每个点携带的 payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub image_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub processing_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub gps_coordinates: Option<GpsCoordinates>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub ai_tags: Vec<String>,
    #[serde(default)]
    pub ai_description: String,
    #[serde(default)]
    pub model_used: String,
    #[serde(default)]
    pub embedding_dim: usize,
}

impl ImagePayload {
    /// 标签不区分大小写地与 `wanted` 有交集
    pub fn has_any_tag(&self, wanted: &[String]) -> bool {
        self.matched_tags(wanted) > 0
    }

    /// `wanted` 中有多少个出现在本图标签里
    pub fn matched_tags(&self, wanted: &[String]) -> usize {
        let own: Vec<String> = self.ai_tags.iter().map(|t| t.trim().to_lowercase()).collect();
        wanted
            .iter()
            .filter(|tag| own.contains(&tag.trim().to_lowercase()))
            .count()
    }
}

/// 一次成功处理产生的完整记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(flatten)]
    pub payload: ImagePayload,
    pub embedding: Vec<f32>,
}

impl ImageRecord {
    /// 每次调用都会生成新的 `image_id`，重复处理同一文件会得到新记录
    pub fn new(
        info: &ImageInfo,
        gps_coordinates: Option<GpsCoordinates>,
        location_name: Option<String>,
        ai_tags: Vec<String>,
        ai_description: String,
        model_used: String,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            payload: ImagePayload {
                image_id: Uuid::new_v4().to_string(),
                file_path: info.path.to_string_lossy().into_owned(),
                file_name: info.file_name.clone(),
                file_size: info.file_size,
                width: info.width,
                height: info.height,
                format: info.format.clone(),
                processing_timestamp: Utc::now(),
                gps_coordinates,
                location_name,
                ai_tags,
                ai_description,
                model_used,
                embedding_dim: embedding.len(),
            },
            embedding,
        }
    }

    pub fn id(&self) -> &str {
        &self.payload.image_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn info() -> ImageInfo {
        ImageInfo {
            path: PathBuf::from("/data/a.jpg"),
            file_name: "a.jpg".to_string(),
            file_size: 10,
            width: 2,
            height: 3,
            format: "JPEG".to_string(),
        }
    }

    #[test]
    fn test_new_record_has_fresh_id() {
        let a = ImageRecord::new(&info(), None, None, vec![], String::new(), "m".into(), vec![0.0; 4]);
        let b = ImageRecord::new(&info(), None, None, vec![], String::new(), "m".into(), vec![0.0; 4]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.payload.embedding_dim, 4);
    }

    #[test]
    fn test_tag_matching_ignores_case() {
        let mut record = ImageRecord::new(&info(), None, None, vec!["Snow".into(), "berg".into()], String::new(), "m".into(), vec![]);
        record.payload.ai_tags.push(" Wald ".into());

        assert!(record.payload.has_any_tag(&["SNOW".to_string()]));
        assert!(record.payload.has_any_tag(&["wald".to_string()]));
        assert!(!record.payload.has_any_tag(&["beach".to_string()]));
        assert_eq!(record.payload.matched_tags(&["snow".into(), "berg".into(), "sea".into()]), 2);
    }

    #[test]
    fn test_payload_wire_shape() {
        let record = ImageRecord::new(
            &info(),
            Some(GpsCoordinates { latitude: 1.0, longitude: 2.0 }),
            Some("berlin".into()),
            vec!["tag".into()],
            "desc".into(),
            "model".into(),
            vec![1.0, 0.0],
        );
        let json = serde_json::to_value(&record.payload).unwrap();
        assert_eq!(json["gps_coordinates"], serde_json::json!([1.0, 2.0]));
        assert_eq!(json["file_path"], "/data/a.jpg");
        assert_eq!(json["embedding_dim"], 2);
        assert!(json.get("embedding").is_none());

        let full = serde_json::to_value(&record).unwrap();
        assert_eq!(full["embedding"], serde_json::json!([1.0, 0.0]));
        assert_eq!(full["image_id"], record.payload.image_id);
    }
}
