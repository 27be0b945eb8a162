use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use crate::cli::{Opts, SubCommandExtend};
use crate::{build_pipeline, server};

#[derive(Parser, Debug, Clone)]
pub struct ServeCommand {
    /// 监听地址，默认取 SERVER_NAME
    #[arg(long)]
    pub host: Option<String>,
    /// 监听端口，默认取 SERVER_PORT
    #[arg(long)]
    pub port: Option<u16>,
}

impl SubCommandExtend for ServeCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let config = opts.config()?;
        let pipeline = build_pipeline(&config).await?;

        let addr = format!("{}:{}", config.server.host, config.server.port);
        let state = server::AppState::new(Arc::new(pipeline), config);
        let app = server::create_app(state);

        info!("服务器启动：http://{}", addr);
        let listener = TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
