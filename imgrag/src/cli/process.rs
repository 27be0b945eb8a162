use std::path::PathBuf;

use clap::Parser;

use crate::build_pipeline;
use crate::cli::{Opts, SubCommandExtend, print_json};

#[derive(Parser, Debug, Clone)]
pub struct ProcessCommand {
    /// 图片路径
    pub path: PathBuf,
}

impl SubCommandExtend for ProcessCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pipeline = build_pipeline(&opts.config()?).await?;
        let processed = pipeline.process_image(&self.path).await?;
        print_json(&processed)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct BulkCommand {
    /// 图片目录，递归扫描
    pub directory: PathBuf,
    /// 最多处理的图片数量
    #[arg(long, value_name = "N")]
    pub max: Option<usize>,
}

impl SubCommandExtend for BulkCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pipeline = build_pipeline(&opts.config()?).await?;
        let summary = pipeline.process_bulk(&self.directory, self.max).await?;
        print_json(&summary)
    }
}
