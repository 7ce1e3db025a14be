mod alias;
mod bridge;
mod catalog;
mod config;
mod device;
mod entity;
mod enumerate;
mod error;
mod host;
mod integrations;
mod mqtt;
mod refresh;
mod scheduler;
mod scripts;
mod template;

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,shelly_discovery=debug")),
        )
        .init();

    tracing::info!("Starting shelly-discovery v{}", env!("CARGO_PKG_VERSION"));

    let path = PathBuf::from(
        std::env::var("SHELLY_DISCOVERY_CONFIG").unwrap_or_else(|_| "shelly-discovery.yaml".to_string()),
    );

    let mut config = if path.exists() {
        let config = config::load_config(&path)?;
        tracing::info!("Loaded config from {}", path.display());
        config
    } else {
        tracing::warn!("Config file {} not found, using defaults", path.display());
        config::BridgeConfig::default()
    };
    config.apply_env();

    mqtt::run_bridge(config).await
}
