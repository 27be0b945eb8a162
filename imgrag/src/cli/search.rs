use std::path::PathBuf;

use clap::Parser;
use imgrag_embeddings::DistanceMetric;
use imgrag_retrieval::SearchQuery;

use crate::build_pipeline;
use crate::cli::{Opts, SubCommandExtend, print_json};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    /// 文本查询
    #[arg(long)]
    pub text: Option<String>,
    /// 以图搜图
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,
    /// 标签过滤，逗号分隔
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    /// 结果数量
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
    /// 距离度量：cosine / euclid / dot / manhattan
    #[arg(long, default_value_t = DistanceMetric::Cosine)]
    pub metric: DistanceMetric,
}

impl SearchCommand {
    pub fn query(&self) -> SearchQuery {
        SearchQuery {
            text: self.text.clone(),
            image_path: self.image.clone(),
            embedding: None,
            tags: self.tags.clone(),
            limit: self.limit,
            metric: self.metric,
        }
    }
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pipeline = build_pipeline(&opts.config()?).await?;
        let response = pipeline.search(&self.query()).await?;
        print_json(&response)
    }
}
