//! seglog: Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use seglog::cli::Cli;
use seglog::config::SegmentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SegmentConfig::from_json_file(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SegmentConfig::default(),
    };

    cli.command.run(&config).await
}
