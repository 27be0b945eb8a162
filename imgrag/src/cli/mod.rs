mod admin;
mod process;
mod search;
mod serve;

pub use admin::*;
pub use process::*;
pub use search::*;
pub use serve::*;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::{Config, StoreBackend};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imgrag", version, about = "图片打标签、描述与向量检索")]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// Qdrant 主机
    #[arg(long, global = true, value_name = "HOST")]
    pub qdrant_host: Option<String>,
    /// Qdrant 端口
    #[arg(long, global = true, value_name = "PORT")]
    pub qdrant_port: Option<u16>,
    /// Ollama OpenAI 兼容接口地址
    #[arg(long, global = true, value_name = "URL")]
    pub ollama_url: Option<String>,
    /// 视觉模型
    #[arg(long, global = true, value_name = "MODEL")]
    pub ollama_model: Option<String>,
    /// 允许访问的目录，可重复或用 `:` 分隔
    #[arg(long, global = true, value_name = "DIR", value_delimiter = ':')]
    pub allowed_paths: Vec<PathBuf>,
    /// 向量库后端
    #[arg(long, global = true, value_enum)]
    pub store: Option<StoreBackend>,
    /// 输出 debug 日志
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 启动 HTTP 服务
    Serve(ServeCommand),
    /// 处理单张图片
    Process(ProcessCommand),
    /// 批量处理目录下的图片
    Bulk(BulkCommand),
    /// 按文本、图片或标签搜索
    Search(SearchCommand),
    /// 检查各组件连接状态
    Status(StatusCommand),
    /// 查看各集合的统计信息
    Collections(CollectionsCommand),
    /// 从所有集合中删除一张图片
    Delete(DeleteCommand),
    /// 删除并重建所有集合
    Reset(ResetCommand),
}

impl Opts {
    /// 环境变量之上叠加命令行参数
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::from_env()?;
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.qdrant_host {
            config.store.qdrant_host = host.clone();
        }
        if let Some(port) = self.qdrant_port {
            config.store.qdrant_port = port;
        }
        if let Some(url) = &self.ollama_url {
            config.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = &self.ollama_model {
            config.llm.model = model.clone();
        }
        if !self.allowed_paths.is_empty() {
            config.processing.allowed_paths = self.allowed_paths.clone();
        }
        if let Some(store) = self.store {
            config.store.backend = store;
        }
        if let SubCommand::Serve(serve) = &self.subcmd {
            if let Some(host) = &serve.host {
                config.server.host = host.clone();
            }
            if let Some(port) = serve.port {
                config.server.port = port;
            }
        }
    }

    pub async fn run(&self) -> Result<()> {
        match &self.subcmd {
            SubCommand::Serve(cmd) => cmd.run(self).await,
            SubCommand::Process(cmd) => cmd.run(self).await,
            SubCommand::Bulk(cmd) => cmd.run(self).await,
            SubCommand::Search(cmd) => cmd.run(self).await,
            SubCommand::Status(cmd) => cmd.run(self).await,
            SubCommand::Collections(cmd) => cmd.run(self).await,
            SubCommand::Delete(cmd) => cmd.run(self).await,
            SubCommand::Reset(cmd) => cmd.run(self).await,
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgrag_embeddings::DistanceMetric;

    #[test]
    fn test_global_flags_override_config() -> anyhow::Result<()> {
        let opts = Opts::try_parse_from([
            "imgrag",
            "--qdrant-host",
            "qdrant.internal",
            "--allowed-paths",
            "/srv/photos:/mnt/usb",
            "--store",
            "memory",
            "serve",
            "--port",
            "9000",
        ])?;
        let mut config = Config::default();
        opts.apply(&mut config);

        assert_eq!(config.store.qdrant_host, "qdrant.internal");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(
            config.processing.allowed_paths,
            vec![PathBuf::from("/srv/photos"), PathBuf::from("/mnt/usb")]
        );
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        Ok(())
    }

    #[test]
    fn test_search_arguments() -> anyhow::Result<()> {
        let opts = Opts::try_parse_from([
            "imgrag", "search", "--text", "snowy peak", "--tags", "snow,Mountain", "--limit", "3", "--metric", "l2",
        ])?;
        let SubCommand::Search(cmd) = opts.subcmd else {
            panic!("expected search command");
        };
        let query = cmd.query();
        assert_eq!(query.text.as_deref(), Some("snowy peak"));
        assert_eq!(query.tags, vec!["snow", "Mountain"]);
        assert_eq!(query.limit, 3);
        assert_eq!(query.metric, DistanceMetric::Euclid);
        Ok(())
    }

    #[test]
    fn test_bulk_and_delete_arguments() -> anyhow::Result<()> {
        let opts = Opts::try_parse_from(["imgrag", "--debug", "bulk", "/srv/photos", "--max", "5"])?;
        assert!(opts.debug);
        let SubCommand::Bulk(cmd) = opts.subcmd else {
            panic!("expected bulk command");
        };
        assert_eq!(cmd.directory, PathBuf::from("/srv/photos"));
        assert_eq!(cmd.max, Some(5));

        let opts = Opts::try_parse_from(["imgrag", "delete", "abc"])?;
        assert!(matches!(opts.subcmd, SubCommand::Delete(DeleteCommand { ref id }) if id == "abc"));
        Ok(())
    }
}
