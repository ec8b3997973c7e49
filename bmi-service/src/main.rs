mod api;
mod config;
mod pages;
mod query;
mod routes;
mod secrets;
mod state;
mod store;

use anyhow::Context;
use config::Config;
use secrets::{AwsSecretsManager, DbCredentials};
use state::AppState;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        error!("Startup failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let config_path = std::env::var("BMI_SERVICE_CONFIG").ok();
    let cfg = Config::load(config_path.as_deref())?;

    let secrets = AwsSecretsManager::new(cfg.region()).await;
    let creds = DbCredentials::fetch(&secrets, cfg.secret_name())
        .await
        .context("Failed to load database credentials")?;

    let state = Arc::new(AppState::from_config(&cfg, &creds));
    let app = routes::router(state);

    let addr: SocketAddr = cfg.listen().parse()?;
    info!(%addr, "Starting bmi-service");

    let server = axum::Server::bind(&addr).serve(app.into_make_service());

    let graceful = server.with_graceful_shutdown(shutdown_signal());
    graceful.await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("Shutdown signal received");
}
