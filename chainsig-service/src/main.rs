use anyhow::Result;
use std::env;

mod api;
mod config;
mod server;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    tracing::info!("Loading configuration from: {}", config_path);

    let config = config::ConfigFile::load(&config_path)?;
    config.validate()?;

    tracing::info!(
        "Signer: {:?} via contract {}",
        config.signer.kind,
        config.signer.contract_id
    );

    server::run(config).await
}
