use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handlers::{
    create_deposit_session, execute_swap, get_deposit_session, get_holdings, get_portfolio,
    get_swap_quote, get_transaction, health_check, payment_webhook, AppState,
};

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                .route("/deposits/sessions", post(create_deposit_session))
                .route("/deposits/sessions/:id", get(get_deposit_session))
                .route("/webhooks/payment", post(payment_webhook))
                .route("/swaps/quote", post(get_swap_quote))
                .route("/swaps", post(execute_swap))
                .route("/transactions/:id", get(get_transaction))
                .route("/portfolio/:user_id", get(get_portfolio))
                .route("/portfolio/:user_id/holdings", get(get_holdings)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(
    app: Router,
    bind_address: &str,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("Server listening on {}", bind_address);

    let mut shutdown = shutdown;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    Ok(())
}
