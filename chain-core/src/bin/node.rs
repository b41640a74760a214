//! Chain node binary

use anyhow::Context;
use chain_core::{Config, Node};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting chain node");

    // Load configuration
    let config = match std::env::var("CHAIN_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("failed to load config from environment")?,
    };

    let node = Node::open(config).context("failed to open node")?;
    let handle = node.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    handle.shutdown().await.context("shutdown failed")?;
    Ok(())
}
