use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use imgrag_embeddings::DistanceMetric;
use imgrag_embeddings::database::CollectionStats;
use imgrag_indexing::ImagePayload;
use imgrag_retrieval::{SearchQuery, SearchResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::error::{AppError, Result};
use super::state::AppState;
use crate::bulk::BulkSummary;
use crate::config::Config;
use crate::pipeline::{ProcessedImage, SystemInfo, SystemStatus};

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub directory: PathBuf,
    #[serde(default)]
    pub max_images: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct MetricParams {
    #[serde(default)]
    pub metric: DistanceMetric,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllowedPaths {
    pub paths: Vec<PathBuf>,
}

/// 各组件连接状态
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    Json(state.pipeline.check_system_status().await)
}

/// 运行时信息加上启动配置（不含密钥）
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    #[serde(flatten)]
    pub system: SystemInfo,
    pub config: Config,
}

pub async fn info_handler(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        system: state.pipeline.system_info(),
        config: state.config.clone(),
    })
}

/// 处理单张图片
pub async fn process_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<ProcessRequest>,
) -> Result<Json<ProcessedImage>> {
    Ok(Json(state.pipeline.process_image(&data.path).await?))
}

/// 批量处理目录
pub async fn bulk_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<BulkRequest>,
) -> Result<Json<BulkSummary>> {
    Ok(Json(state.pipeline.process_bulk(&data.directory, data.max_images).await?))
}

pub async fn get_image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<MetricParams>,
) -> Result<Json<ImagePayload>> {
    match state.pipeline.get_image(&id, params.metric).await? {
        Some(record) => Ok(Json(record.payload)),
        None => Err(AppError::not_found(format!("Image not found: {}", id))),
    }
}

pub async fn delete_image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    state.pipeline.delete_image(&id).await?;
    Ok(Json(json!({ "deleted": id })))
}

/// 文本 / 图片 / 向量 / 标签搜索
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(query): Json<SearchQuery>,
) -> Result<Json<SearchResponse>> {
    Ok(Json(state.pipeline.search(&query).await?))
}

pub async fn collections_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<CollectionStats>>> {
    Ok(Json(state.pipeline.collections().await?))
}

pub async fn get_paths_handler(State(state): State<Arc<AppState>>) -> Json<AllowedPaths> {
    Json(AllowedPaths {
        paths: state.pipeline.paths().roots(),
    })
}

/// 替换白名单，所有路径必须存在
pub async fn set_paths_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<AllowedPaths>,
) -> Result<Json<AllowedPaths>> {
    if data.paths.is_empty() {
        return Err(AppError::bad_request("Please enter at least one path"));
    }
    if let Some(missing) = data.paths.iter().find(|p| !p.exists()) {
        return Err(AppError::bad_request(format!("Path does not exist: {}", missing.display())));
    }

    info!("Allowed paths set to {:?}", data.paths);
    state.pipeline.paths().set_roots(data.paths.clone());
    Ok(Json(data))
}
