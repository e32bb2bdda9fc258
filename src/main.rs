use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use sqlcontext::config::Config;
use sqlcontext::database::{get_pool_stats, health_check};
use sqlcontext::{logging, DbContext};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = env::args().nth(1).map(PathBuf::from);

    // Load configuration
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize logging
    logging::init(&config.logging);

    tracing::info!("Starting sqlcontext");
    if let Some(path) = &config_path {
        tracing::info!("Configuration file: {}", path.display());
    }

    let context = DbContext::from_config(&config)
        .await
        .context("Failed to create data context")?;
    tracing::info!("Dialect: {}", context.dialect());

    let health = health_check(context.pool()).await;
    let stats = get_pool_stats(context.pool());
    tracing::info!("Pool statistics: size={}, idle={}", stats.size, stats.num_idle);

    context.close().await;

    health.context("Database health check failed")?;
    tracing::info!("Database is healthy");
    Ok(())
}
