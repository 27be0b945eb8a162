use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use imgrag_embeddings::database::CollectionStats;
use imgrag_embeddings::embedding::{save_image_record, vector_record_to_image_record};
use imgrag_embeddings::{DistanceMetric, EmbeddingClient, VectorStore};
use imgrag_indexing::gps::read_gps;
use imgrag_indexing::image_file::{load_for_model, read_image_info};
use imgrag_indexing::metadata::{EmbeddedMetadata, write_metadata};
use imgrag_indexing::{GpsCoordinates, ImageRecord, ImageScanner, PathValidator};
use imgrag_retrieval::{SearchQuery, SearchResponse, SearchResult, SearchRouter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ProcessError, ProcessResult};
use crate::geo::ReverseGeocoder;
use crate::llm::{LlmClient, VisionAnalyzer};

/// 流程参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub max_tags: usize,
    pub tag_language: String,
    pub max_image_size: u32,
    pub batch_size: usize,
    pub write_file_metadata: bool,
    pub supported_extensions: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_tags: 10,
            tag_language: "English".to_string(),
            max_image_size: 1024,
            batch_size: 10,
            write_file_metadata: true,
            supported_extensions: imgrag_indexing::scan::DEFAULT_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedImage {
    pub image_data: ImageRecord,
    /// 描述与标签是否已写回原文件
    pub metadata_written: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub component: String,
    pub status: String,
    pub detail: String,
}

impl ComponentStatus {
    fn from_result(component: &str, result: anyhow::Result<String>) -> Self {
        match result {
            Ok(detail) => Self {
                component: component.to_string(),
                status: "connected".to_string(),
                detail,
            },
            Err(e) => Self {
                component: component.to_string(),
                status: "error".to_string(),
                detail: e.to_string(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "connected"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub timestamp: DateTime<Utc>,
    pub components: Vec<ComponentStatus>,
    pub overall_status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub llm_model: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub geocoder_enabled: bool,
    pub allowed_paths: Vec<PathBuf>,
    pub settings: PipelineSettings,
    pub timestamp: DateTime<Utc>,
}

/// 单张图片的处理流程
///
/// 路径校验 → 读取图片信息 → GPS → 地名 → 标签与描述 → 向量 → 入库 → 回写元数据，
/// 每一步依次等待，某一步失败即返回对应的 [`ProcessError`]，已完成的副作用不回滚。
pub struct ImagePipeline {
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    paths: PathValidator,
    scanner: ImageScanner,
    analyzer: VisionAnalyzer,
    settings: PipelineSettings,
}

impl ImagePipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        paths: PathValidator,
        settings: PipelineSettings,
    ) -> Self {
        let analyzer = VisionAnalyzer::new(llm.clone(), settings.max_tags)
            .with_language(settings.tag_language.clone());
        Self {
            llm,
            embedder,
            store,
            geocoder: None,
            paths,
            scanner: ImageScanner::new(&settings.supported_extensions),
            analyzer,
            settings,
        }
    }

    pub fn with_geocoder(mut self, geocoder: Option<Arc<dyn ReverseGeocoder>>) -> Self {
        self.geocoder = geocoder;
        self
    }

    pub fn paths(&self) -> &PathValidator {
        &self.paths
    }

    pub fn scanner(&self) -> &ImageScanner {
        &self.scanner
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// 创建缺失的集合
    pub async fn initialize(&self) -> ProcessResult<()> {
        self.store
            .ensure_collections()
            .await
            .map_err(|e| ProcessError::Store(e.to_string()))
    }

    pub async fn process_image(&self, path: &Path) -> ProcessResult<ProcessedImage> {
        let path = self.paths.check(path)?;
        if !path.exists() {
            return Err(ProcessError::NotFound(path));
        }
        if !self.scanner.is_supported(&path) {
            return Err(ProcessError::UnsupportedFormat(path));
        }

        let info = read_image_info(&path)?;
        debug!("{}: {}x{} {}", info.file_name, info.width, info.height, info.format);

        let gps = read_gps(&path);
        let location = match gps {
            Some(coords) => self.locate(coords).await,
            None => None,
        };

        let image = load_for_model(&path, self.settings.max_image_size)?;

        let analysis = self
            .analyzer
            .analyze(&image)
            .await
            .map_err(|e| ProcessError::AiAnalysis(e.to_string()))?;
        debug!("{}: {} tags", info.file_name, analysis.tags.len());

        let embedding = self
            .embedder
            .embed_images(vec![image])
            .await
            .map_err(|e| ProcessError::Embedding(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| ProcessError::Embedding("no embedding returned".to_string()))?;
        if embedding.len() != self.store.dimension() {
            return Err(ProcessError::Embedding(format!(
                "dimension mismatch: expected {}, got {}",
                self.store.dimension(),
                embedding.len()
            )));
        }

        let record = ImageRecord::new(
            &info,
            gps,
            location,
            analysis.tags,
            analysis.description,
            analysis.model_used,
            embedding,
        );

        save_image_record(self.store.as_ref(), &record)
            .await
            .map_err(|e| ProcessError::Store(e.to_string()))?;

        let metadata_written = self.settings.write_file_metadata && self.embed_metadata(&path, &record);

        info!("Processed {} as {}", info.file_name, record.id());
        Ok(ProcessedImage {
            message: format!("Successfully processed {}", info.file_name),
            image_data: record,
            metadata_written,
        })
    }

    /// 地名查询失败不影响流程
    async fn locate(&self, coords: GpsCoordinates) -> Option<String> {
        let geocoder = self.geocoder.as_ref()?;
        match geocoder.reverse(coords).await {
            Ok(location) => location,
            Err(e) => {
                warn!("reverse geocoding {:?} failed: {}", coords, e);
                None
            }
        }
    }

    fn embed_metadata(&self, path: &Path, record: &ImageRecord) -> bool {
        match write_metadata(path, &EmbeddedMetadata::from(&record.payload)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to add metadata to {}: {}", path.display(), e);
                false
            }
        }
    }

    pub async fn search(&self, query: &SearchQuery) -> SearchResult<SearchResponse> {
        SearchRouter::new(self.embedder.clone(), self.store.clone(), self.paths.clone())
            .with_max_image_size(self.settings.max_image_size)
            .search(query)
            .await
    }

    pub async fn get_image(&self, id: &str, metric: DistanceMetric) -> ProcessResult<Option<ImageRecord>> {
        let found = self
            .store
            .get_vector(metric, id)
            .await
            .map_err(|e| ProcessError::Store(e.to_string()))?;
        found
            .map(vector_record_to_image_record)
            .transpose()
            .map_err(|e| ProcessError::Store(e.to_string()))
    }

    pub async fn delete_image(&self, id: &str) -> ProcessResult<()> {
        self.store
            .delete_vector(vec![id.to_string()])
            .await
            .map_err(|e| ProcessError::Store(e.to_string()))?;
        info!("Deleted {}", id);
        Ok(())
    }

    pub async fn collections(&self) -> ProcessResult<Vec<CollectionStats>> {
        self.store
            .collection_stats()
            .await
            .map_err(|e| ProcessError::Store(e.to_string()))
    }

    /// 删除所有集合后重新创建
    pub async fn reset(&self) -> ProcessResult<()> {
        self.store
            .drop_collections()
            .await
            .map_err(|e| ProcessError::Store(e.to_string()))?;
        warn!("All collections dropped");
        self.initialize().await
    }

    pub async fn check_system_status(&self) -> SystemStatus {
        let llm = ComponentStatus::from_result("llm", self.llm.health().await);

        let probe = self.embedder.embed(vec!["health check".to_string()]).await;
        let embedder = ComponentStatus::from_result(
            "embedding",
            probe
                .map_err(anyhow::Error::from)
                .map(|vectors| format!("{} loaded, dimension {}", self.embedder.model_name(), vectors.first().map_or(0, Vec::len))),
        );

        let store = ComponentStatus::from_result("vector_store", self.store.health().await);

        let components = vec![llm, embedder, store];
        let overall_status = if components.iter().all(ComponentStatus::is_ok) {
            "healthy"
        } else {
            "issues_detected"
        };
        SystemStatus {
            timestamp: Utc::now(),
            components,
            overall_status: overall_status.to_string(),
        }
    }

    pub fn system_info(&self) -> SystemInfo {
        SystemInfo {
            llm_model: self.llm.model_name(),
            embedding_model: self.embedder.model_name(),
            embedding_dim: self.store.dimension(),
            geocoder_enabled: self.geocoder.is_some(),
            allowed_paths: self.paths.roots(),
            settings: self.settings.clone(),
            timestamp: Utc::now(),
        }
    }
}
