use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{error, info};

use crate::{
    alerts::{AlertKind, OpsAlertStore},
    api::AppState,
    catalog::AssetCatalog,
    chain::{ChainClient, HttpChainClient},
    config::Config,
    dedup::EventDedupLedger,
    error::AppResult,
    intents::IntentRepository,
    jobs::{JobQueue, WorkerPool},
    portfolio::PortfolioRepository,
    providers::{build_swap_provider, SwapProvider},
    reconciler::BalanceReconciler,
    workers::{
        DepositCompletionHandler, DepositConfirmationHandler, SwapConfirmationHandler,
        SwapExecutionHandler,
    },
};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const SWAP_SWEEP_INTERVAL: Duration = Duration::from_secs(600);
/// A swap PROCESSING for longer than this raises an ops alert.
const SWAP_OVERDUE_MINUTES: i64 = 30;

pub async fn initialize_app_state(
    config: Arc<Config>,
    shutdown: watch::Receiver<bool>,
) -> AppResult<(AppState, WorkerPool)> {
    info!("Initializing application components");

    let pool = initialize_database(&config.database_url).await?;

    let intents = Arc::new(IntentRepository::new(pool.clone()));
    let portfolios = Arc::new(PortfolioRepository::new(pool.clone()));
    let dedup = Arc::new(EventDedupLedger::new(pool.clone()));
    let reconciler = Arc::new(BalanceReconciler::new(pool.clone()));
    let catalog = Arc::new(AssetCatalog::new());
    let queue = Arc::new(JobQueue::new(pool.clone()));

    let chain: Arc<dyn ChainClient> =
        Arc::new(HttpChainClient::new(config.chain_indexer_url.clone()));
    let swap_provider = build_swap_provider(&config)?;
    info!(provider = swap_provider.provider_name(), "Swap provider configured");

    let mut worker_pool = WorkerPool::new(queue.clone(), &config);
    worker_pool.register(Arc::new(DepositCompletionHandler::new(
        intents.clone(),
        reconciler.clone(),
        catalog.clone(),
    )));
    worker_pool.register(Arc::new(DepositConfirmationHandler::new(
        intents.clone(),
        dedup.clone(),
        chain.clone(),
        reconciler.clone(),
        catalog.clone(),
        OpsAlertStore::new(pool.clone()),
        config.confirmation_depth,
        Duration::from_secs(config.confirmation_poll_seconds),
    )));
    worker_pool.register(Arc::new(SwapExecutionHandler::new(
        intents.clone(),
        swap_provider.clone(),
        queue.clone(),
    )));
    worker_pool.register(Arc::new(SwapConfirmationHandler::new(
        intents.clone(),
        swap_provider.clone(),
        reconciler.clone(),
        catalog.clone(),
        Duration::from_secs(config.confirmation_poll_seconds),
    )));
    info!("Job handlers registered");

    spawn_session_sweep(intents.clone(), shutdown.clone());
    spawn_swap_overdue_sweep(intents.clone(), OpsAlertStore::new(pool.clone()), shutdown);

    let state = AppState {
        pool,
        config,
        intents,
        portfolios,
        queue,
        catalog,
        chain,
        swap_provider,
    };

    Ok((state, worker_pool))
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database connected, migrations applied");

    Ok(pool)
}

/// Periodically expire AWAITING_TRANSFER sessions whose scan window ran
/// out. Idempotent and crash-safe: the status-guarded UPDATE does nothing
/// for sessions another instance already expired.
fn spawn_session_sweep(intents: Arc<IntentRepository>, mut shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(SESSION_SWEEP_INTERVAL) => {}
            }
            match intents.expire_overdue_sessions().await {
                Ok(0) => {}
                Ok(n) => info!(count = n, "Expired overdue deposit sessions"),
                Err(e) => error!("Session expiry sweep failed: {}", e),
            }
        }
    });
}

/// Flag swaps stuck in PROCESSING beyond their wall-clock budget. The
/// pipeline keeps polling them; this sweep only makes the delay visible.
fn spawn_swap_overdue_sweep(
    intents: Arc<IntentRepository>,
    alerts: OpsAlertStore,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(SWAP_SWEEP_INTERVAL) => {}
            }
            let overdue = match intents
                .find_overdue_processing_swaps(SWAP_OVERDUE_MINUTES)
                .await
            {
                Ok(overdue) => overdue,
                Err(e) => {
                    error!("Overdue swap sweep failed: {}", e);
                    continue;
                }
            };

            for tx in overdue {
                let details = serde_json::json!({
                    "transaction_id": tx.id,
                    "provider_order_id": tx.provider_order_id,
                    "processing_since": tx.updated_at,
                });
                if let Err(e) = alerts.record(AlertKind::SwapOverdue, Some(tx.id), details).await {
                    error!(transaction_id = %tx.id, "Failed to record overdue-swap alert: {}", e);
                }
            }
        }
    });
}
