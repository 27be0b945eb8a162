use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::ImagePipeline;

/// 应用状态
pub struct AppState {
    pub pipeline: Arc<ImagePipeline>,
    /// 启动时的配置，仅用于展示
    pub config: Config,
}

impl AppState {
    pub fn new(pipeline: Arc<ImagePipeline>, config: Config) -> Arc<Self> {
        Arc::new(AppState { pipeline, config })
    }
}
