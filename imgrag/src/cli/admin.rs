use clap::Parser;
use tracing::warn;

use crate::build_pipeline;
use crate::cli::{Opts, SubCommandExtend, print_json};

#[derive(Parser, Debug, Clone)]
pub struct StatusCommand {}

impl SubCommandExtend for StatusCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pipeline = build_pipeline(&opts.config()?).await?;
        let status = pipeline.check_system_status().await;
        for component in status.components.iter().filter(|c| !c.is_ok()) {
            warn!("{}: {}", component.component, component.detail);
        }
        print_json(&status)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct CollectionsCommand {}

impl SubCommandExtend for CollectionsCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pipeline = build_pipeline(&opts.config()?).await?;
        print_json(&pipeline.collections().await?)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// 图片 ID
    pub id: String,
}

impl SubCommandExtend for DeleteCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pipeline = build_pipeline(&opts.config()?).await?;
        pipeline.delete_image(&self.id).await?;
        print_json(&serde_json::json!({ "deleted": self.id }))
    }
}

#[derive(Parser, Debug, Clone)]
pub struct ResetCommand {}

impl SubCommandExtend for ResetCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let pipeline = build_pipeline(&opts.config()?).await?;
        pipeline.reset().await?;
        print_json(&pipeline.collections().await?)
    }
}
