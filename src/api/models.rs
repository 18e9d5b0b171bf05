use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::intents::{DepositSession, LedgerTransaction, SessionStatus, TransactionStatus};
use crate::portfolio::{Portfolio, PortfolioHolding};

// ========== REQUEST MODELS ==========

/// Open a deposit session: "I am about to send tokens to this address".
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDepositSessionRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
    pub chain_id: i32,
    #[validate(length(min = 1, max = 16))]
    pub token_symbol: String,
    #[validate(length(min = 1, max = 128))]
    pub token_address: String,
    /// Exact amount match when set; otherwise the [min, max] window applies.
    pub expected_amount: Option<Decimal>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
}

/// Webhook from the payment provider: fiat has landed (or failed to).
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentWebhookPayload {
    pub user_id: Uuid,
    /// Provider-side reference, unique per payment. The idempotency key.
    #[validate(length(min = 1, max = 128))]
    pub payment_ref: String,
    #[validate(length(min = 1, max = 64))]
    pub payment_account: String,
    #[validate(length(min = 1, max = 16))]
    pub currency: String,
    pub amount: Decimal,
    pub usd_value: Decimal,
    /// Provider status; only "success" creates work. Anything else is
    /// acknowledged and dropped so the provider stops redelivering.
    #[validate(length(min = 1, max = 32))]
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SwapRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 16))]
    pub from_asset: String,
    #[validate(length(min = 1, max = 16))]
    pub to_asset: String,
    pub amount: Decimal,
    pub usd_value: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate(length(min = 1, max = 16))]
    pub from_asset: String,
    #[validate(length(min = 1, max = 16))]
    pub to_asset: String,
    pub amount: Decimal,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct DepositSessionResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub wallet_address: String,
    pub chain_id: i32,
    pub token_symbol: String,
    pub matched_tx_id: Option<String>,
    pub matched_amount: Option<Decimal>,
    pub expires_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

impl From<DepositSession> for DepositSessionResponse {
    fn from(s: DepositSession) -> Self {
        Self {
            session_id: s.id,
            status: s.status,
            wallet_address: s.wallet_address,
            chain_id: s.chain_id,
            token_symbol: s.token_symbol,
            matched_tx_id: s.matched_tx_id,
            matched_amount: s.matched_amount,
            expires_at: s.expires_at,
            failure_reason: s.failure_reason,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
    pub source_asset: String,
    pub source_amount: Decimal,
    pub destination_asset: String,
    pub destination_amount: Option<Decimal>,
    pub usd_value: Decimal,
    pub provider_order_id: Option<String>,
    pub failure_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<LedgerTransaction> for TransactionResponse {
    fn from(t: LedgerTransaction) -> Self {
        Self {
            transaction_id: t.id,
            status: t.status,
            source_asset: t.source_asset,
            source_amount: t.source_amount,
            destination_asset: t.destination_asset,
            destination_amount: t.destination_amount,
            usd_value: t.usd_value,
            provider_order_id: t.provider_order_id,
            failure_reason: t.failure_reason,
            completed_at: t.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PortfolioResponse {
    pub user_id: Uuid,
    pub total_value_usd: Decimal,
    pub total_deposited_usd: Decimal,
    pub all_time_return_pct: Decimal,
    pub cash_usd: Decimal,
    pub cash_pct: Decimal,
    pub stable_yield_usd: Decimal,
    pub stable_yield_pct: Decimal,
    pub equity_usd: Decimal,
    pub equity_pct: Decimal,
    pub gold_usd: Decimal,
    pub gold_pct: Decimal,
    pub crypto_usd: Decimal,
    pub crypto_pct: Decimal,
}

impl From<Portfolio> for PortfolioResponse {
    fn from(p: Portfolio) -> Self {
        Self {
            user_id: p.user_id,
            total_value_usd: p.total_value_usd,
            total_deposited_usd: p.total_deposited_usd,
            all_time_return_pct: p.all_time_return_pct,
            cash_usd: p.cash_usd,
            cash_pct: p.cash_pct,
            stable_yield_usd: p.stable_yield_usd,
            stable_yield_pct: p.stable_yield_pct,
            equity_usd: p.equity_usd,
            equity_pct: p.equity_pct,
            gold_usd: p.gold_usd,
            gold_pct: p.gold_pct,
            crypto_usd: p.crypto_usd,
            crypto_pct: p.crypto_pct,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HoldingResponse {
    pub symbol: String,
    pub category: crate::portfolio::AssetCategory,
    pub balance: Decimal,
    pub value_usd: Decimal,
}

impl From<PortfolioHolding> for HoldingResponse {
    fn from(h: PortfolioHolding) -> Self {
        Self {
            symbol: h.symbol,
            category: h.category,
            balance: h.balance,
            value_usd: h.value_usd,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub from_asset: String,
    pub to_asset: String,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub rate: Decimal,
    pub provider: String,
    pub expires_at_unix: i64,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub payment_ref: String,
    pub accepted: bool,
    pub transaction_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}
