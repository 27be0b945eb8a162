use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use imgrag_indexing::ImagePayload;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ProcessError, ProcessResult};
use crate::pipeline::ImagePipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItem {
    pub image_path: PathBuf,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<ImagePayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkSummary {
    pub directory: PathBuf,
    pub total_images: usize,
    pub processed: usize,
    pub failed: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub results: Vec<BulkItem>,
}

impl ImagePipeline {
    /// 顺序处理目录下的所有图片，单张失败只记录不中断
    pub async fn process_bulk(&self, directory: &Path, max_images: Option<usize>) -> ProcessResult<BulkSummary> {
        let directory = self.paths().check(directory)?;
        if !directory.is_dir() {
            return Err(ProcessError::NotFound(directory));
        }

        let files = self.scanner().scan(&directory, max_images);
        if files.is_empty() {
            return Err(ProcessError::NoImagesFound(directory));
        }

        let total_images = files.len();
        let batch_size = self.settings().batch_size.max(1);
        let start_time = Utc::now();
        info!("Bulk processing {} images in {}", total_images, directory.display());

        let mut results = Vec::with_capacity(total_images);
        let (mut processed, mut failed) = (0, 0);

        for (i, path) in files.into_iter().enumerate() {
            match self.process_image(&path).await {
                Ok(done) => {
                    processed += 1;
                    results.push(BulkItem {
                        image_path: path,
                        status: ItemStatus::Success,
                        error_kind: None,
                        error: None,
                        record: Some(done.image_data.payload),
                    });
                }
                Err(e) => {
                    failed += 1;
                    warn!("Failed to process {}: {}", path.display(), e);
                    results.push(BulkItem {
                        image_path: path,
                        status: ItemStatus::Failed,
                        error_kind: Some(e.kind().to_string()),
                        error: Some(e.to_string()),
                        record: None,
                    });
                }
            }

            if (i + 1) % batch_size == 0 || i + 1 == total_images {
                info!("Progress {}/{} ({} processed, {} failed)", i + 1, total_images, processed, failed);
            }
        }

        Ok(BulkSummary {
            directory,
            total_images,
            processed,
            failed,
            start_time,
            end_time: Utc::now(),
            results,
        })
    }
}
