mod api;
mod error;
mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use self::error::AppError;
pub use self::state::*;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(api::status_handler))
        .route("/info", get(api::info_handler))
        .route("/images", axum::routing::post(api::process_handler))
        .route("/images/bulk", axum::routing::post(api::bulk_handler))
        .route("/images/{id}", get(api::get_image_handler).delete(api::delete_image_handler))
        .route("/search", axum::routing::post(api::search_handler))
        .route("/collections", get(api::collections_handler))
        .route("/allowed-paths", get(api::get_paths_handler).put(api::set_paths_handler))
        // 请求体只有 JSON，嵌入向量也在其中：1M
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
