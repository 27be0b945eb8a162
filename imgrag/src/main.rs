use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use imgrag::cli::Opts;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let opts = Opts::parse();

    let default_level = if opts.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = opts.config()?;
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!("{}", problem);
        }
        anyhow::bail!("Configuration validation failed: {} problem(s)", problems.len());
    }

    opts.run().await
}
