use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use tracing::*;
use tracing_subscriber::EnvFilter;

use config::{Config, LogFormat};
use gateway::KubeGateway;

mod config;
mod export;
mod form;
mod gateway;
mod resource;
mod server;
mod status;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    // Credentials are resolved once here and shared by every request.
    let client = Client::try_default()
        .await
        .context("Failed to load Kubernetes client configuration")?;
    let gateway = Arc::new(KubeGateway::new(client));

    server::serve(&config, gateway).await?;
    info!("dashboard terminated");
    Ok(())
}
