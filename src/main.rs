mod alerts;
mod api;
mod bootstrap;
mod catalog;
mod chain;
mod config;
mod dedup;
mod error;
mod intents;
mod jobs;
mod portfolio;
mod providers;
mod reconciler;
mod server;
mod workers;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    dotenv::dotenv().ok();

    info!("Starting settlement pipeline");

    let config = Arc::new(config::Config::from_env()?);
    let grace = Duration::from_secs(config.shutdown_grace_seconds);
    let bind_address = config.bind_address.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (state, worker_pool) = bootstrap::initialize_app_state(config, shutdown_rx.clone()).await?;

    let pool_handle = tokio::spawn(worker_pool.run(shutdown_rx.clone()));

    let app = server::create_app(state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(app, &bind_address, shutdown_rx).await {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining");
    let _ = shutdown_tx.send(true);

    // Give in-flight jobs the grace period, then exit regardless. Any job
    // still holding a lock is recovered by the stall sweep on next start.
    let drain = async {
        let _ = pool_handle.await;
        let _ = server_handle.await;
    };
    if tokio::time::timeout(grace, drain).await.is_err() {
        info!("Grace period elapsed with jobs still in flight");
    }

    info!("Shutdown complete");
    Ok(())
}
