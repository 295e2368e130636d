//! Gesture Camera - Main Entry Point

use anyhow::Context;
use api::config::CONFIG_FILE;
use api::{init_logging, run_server, ServiceConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::load(CONFIG_FILE).context("Failed to load configuration")?;
    init_logging(config.log_level()).context("Failed to set tracing subscriber")?;

    info!("=== Gesture Camera v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Model {}, JPEG quality {}", config.model_path, config.jpeg_quality);

    run_server(config).await
}
