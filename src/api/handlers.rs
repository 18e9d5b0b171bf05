use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use super::models::*;
use crate::{
    catalog::AssetCatalog,
    chain::ChainClient,
    config::Config,
    error::{AppError, AppResult},
    intents::{IntentRepository, NewPaymentDeposit, NewSwap},
    jobs::{
        DepositCompletionPayload, JobKind, JobQueue, NewJob, OnchainConfirmationPayload,
        SwapExecutionPayload,
    },
    portfolio::PortfolioRepository,
    providers::SwapProvider,
};

/// Generous caps for repeating poll jobs; the deadline bounds their
/// lifetime, the cap only catches runaway error loops.
const CONFIRMATION_MAX_ATTEMPTS: i32 = 600;
const COMPLETION_MAX_ATTEMPTS: i32 = 10;
const EXECUTION_MAX_ATTEMPTS: i32 = 10;

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub config: Arc<Config>,
    pub intents: Arc<IntentRepository>,
    pub portfolios: Arc<PortfolioRepository>,
    pub queue: Arc<JobQueue>,
    pub catalog: Arc<AssetCatalog>,
    pub chain: Arc<dyn ChainClient>,
    pub swap_provider: Arc<dyn SwapProvider>,
}

/// Open a deposit session and schedule its confirmation job
/// POST /api/v1/deposits/sessions
pub async fn create_deposit_session(
    State(state): State<AppState>,
    Json(request): Json<CreateDepositSessionRequest>,
) -> AppResult<Json<DepositSessionResponse>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    // Only catalogued assets can be deposited
    state.catalog.get_asset_category(&request.token_symbol)?;

    let min_amount = request.min_amount.unwrap_or(Decimal::ZERO);
    if let (Some(min), Some(max)) = (request.min_amount, request.max_amount) {
        if min > max {
            return Err(AppError::InvalidInput(
                "min_amount exceeds max_amount".to_string(),
            ));
        }
    }

    // Scan window starts at the chain head observed at intent time; an
    // earlier transfer cannot be claimed by this session.
    let created_at_block = state.chain.latest_block(request.chain_id).await?;

    let session = state
        .intents
        .create_session(
            request.user_id,
            &request.wallet_address,
            request.chain_id,
            &request.token_symbol,
            &request.token_address,
            request.expected_amount,
            min_amount,
            request.max_amount,
            created_at_block,
            state.config.deposit_session_ttl_minutes,
        )
        .await?;

    let payload = OnchainConfirmationPayload {
        session_id: session.id,
    };
    state
        .queue
        .enqueue(NewJob {
            kind: JobKind::OnchainDepositConfirmation,
            job_key: payload.job_key(),
            payload: serde_json::to_value(&payload)
                .map_err(|e| AppError::Internal(e.to_string()))?,
            max_attempts: CONFIRMATION_MAX_ATTEMPTS,
            delay: None,
            // Enough room past expiry for a matched transfer to confirm.
            deadline_at: Some(session.expires_at + ChronoDuration::hours(6)),
        })
        .await?;

    Ok(Json(session.into()))
}

/// GET /api/v1/deposits/sessions/:id
pub async fn get_deposit_session(
    State(state): State<AppState>,
    Path(session_id): Path<uuid::Uuid>,
) -> AppResult<Json<DepositSessionResponse>> {
    let session = state
        .intents
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Deposit session {}", session_id)))?;

    Ok(Json(session.into()))
}

/// Payment provider webhook. Must respond fast; settlement happens in the
/// completion job. Safe to deliver any number of times: the payment_ref
/// uniqueness collapses duplicates onto the original transaction, and the
/// job key collapses duplicate jobs.
/// POST /api/v1/webhooks/payment
pub async fn payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentWebhookPayload>,
) -> AppResult<Json<WebhookAck>> {
    payload
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    if !payload.status.eq_ignore_ascii_case("success") {
        info!(payment_ref = %payload.payment_ref, status = %payload.status, "Ignoring non-success payment webhook");
        return Ok(Json(WebhookAck {
            payment_ref: payload.payment_ref,
            accepted: false,
            transaction_id: None,
        }));
    }

    if payload.amount <= Decimal::ZERO || payload.usd_value <= Decimal::ZERO {
        return Err(AppError::InvalidInput(
            "payment amount must be positive".to_string(),
        ));
    }
    state.catalog.get_asset_category(&payload.currency)?;

    let tx = state
        .intents
        .create_payment_deposit(NewPaymentDeposit {
            user_id: payload.user_id,
            payment_ref: payload.payment_ref.clone(),
            payment_account: payload.payment_account.clone(),
            source_asset: payload.currency.to_uppercase(),
            source_amount: payload.amount,
            destination_asset: "USD".to_string(),
            usd_value: payload.usd_value,
            allocation: None,
        })
        .await?;

    let job_payload = DepositCompletionPayload {
        payment_ref: payload.payment_ref.clone(),
    };
    state
        .queue
        .enqueue(NewJob {
            kind: JobKind::DepositCompletion,
            job_key: job_payload.job_key(),
            payload: serde_json::to_value(&job_payload)
                .map_err(|e| AppError::Internal(e.to_string()))?,
            max_attempts: COMPLETION_MAX_ATTEMPTS,
            delay: None,
            deadline_at: None,
        })
        .await?;

    info!(payment_ref = %payload.payment_ref, transaction_id = %tx.id, "Payment webhook accepted");
    Ok(Json(WebhookAck {
        payment_ref: payload.payment_ref,
        accepted: true,
        transaction_id: Some(tx.id),
    }))
}

/// Indicative quote from the configured venue
/// POST /api/v1/swaps/quote
pub async fn get_swap_quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> AppResult<Json<QuoteResponse>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    if request.amount <= Decimal::ZERO {
        return Err(AppError::InvalidInput("amount must be positive".to_string()));
    }
    state.catalog.get_asset_category(&request.from_asset)?;
    state.catalog.get_asset_category(&request.to_asset)?;

    let quote = state
        .swap_provider
        .get_quote(&request.from_asset, &request.to_asset, request.amount)
        .await?;

    Ok(Json(QuoteResponse {
        from_asset: quote.from_asset,
        to_asset: quote.to_asset,
        amount_in: quote.amount_in,
        amount_out: quote.amount_out,
        rate: quote.rate,
        provider: quote.provider,
        expires_at_unix: quote.expires_at_unix,
    }))
}

/// Create a swap intent and schedule its execution
/// POST /api/v1/swaps
pub async fn execute_swap(
    State(state): State<AppState>,
    Json(request): Json<SwapRequest>,
) -> AppResult<Json<TransactionResponse>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    if request.amount <= Decimal::ZERO || request.usd_value <= Decimal::ZERO {
        return Err(AppError::InvalidInput("amount must be positive".to_string()));
    }
    if request.from_asset.eq_ignore_ascii_case(&request.to_asset) {
        return Err(AppError::InvalidInput(
            "from_asset and to_asset are the same".to_string(),
        ));
    }
    state.catalog.get_asset_category(&request.from_asset)?;
    state.catalog.get_asset_category(&request.to_asset)?;

    let tx = state
        .intents
        .create_swap(NewSwap {
            user_id: request.user_id,
            source_asset: request.from_asset.to_uppercase(),
            source_amount: request.amount,
            destination_asset: request.to_asset.to_uppercase(),
            usd_value: request.usd_value,
        })
        .await?;

    let payload = SwapExecutionPayload { transaction_id: tx.id };
    state
        .queue
        .enqueue(NewJob {
            kind: JobKind::SwapExecution,
            job_key: payload.job_key(),
            payload: serde_json::to_value(&payload)
                .map_err(|e| AppError::Internal(e.to_string()))?,
            max_attempts: EXECUTION_MAX_ATTEMPTS,
            delay: None,
            deadline_at: None,
        })
        .await?;

    Ok(Json(tx.into()))
}

/// GET /api/v1/transactions/:id
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<uuid::Uuid>,
) -> AppResult<Json<TransactionResponse>> {
    let tx = state
        .intents
        .get_transaction(transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {}", transaction_id)))?;

    Ok(Json(tx.into()))
}

/// GET /api/v1/portfolio/:user_id
pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(user_id): Path<uuid::Uuid>,
) -> AppResult<Json<PortfolioResponse>> {
    let portfolio = state
        .portfolios
        .get_portfolio(user_id)
        .await?
        .unwrap_or_else(|| crate::portfolio::Portfolio::empty(user_id));

    Ok(Json(portfolio.into()))
}

/// GET /api/v1/portfolio/:user_id/holdings
pub async fn get_holdings(
    State(state): State<AppState>,
    Path(user_id): Path<uuid::Uuid>,
) -> AppResult<Json<Vec<HoldingResponse>>> {
    let holdings = state.portfolios.get_holdings(user_id).await?;
    Ok(Json(holdings.into_iter().map(Into::into).collect()))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let database = match sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => "up".to_string(),
        Err(_) => "down".to_string(),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        database,
    }))
}
