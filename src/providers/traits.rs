use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// Shared order status every provider vocabulary is mapped onto before
/// results reach the rest of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapOrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SwapOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwapOrderStatus::Completed | SwapOrderStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapQuote {
    pub from_asset: String,
    pub to_asset: String,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub rate: Decimal,
    pub provider: String,
    pub expires_at_unix: i64,
}

#[derive(Debug, Clone)]
pub struct SwapOrderRequest {
    pub from_asset: String,
    pub to_asset: String,
    pub amount_in: Decimal,
    pub min_amount_out: Decimal,
    /// Client-supplied idempotency token, one per Transaction.
    pub client_order_ref: String,
}

/// A placed order, as acknowledged by the venue.
#[derive(Debug, Clone)]
pub struct SwapOrder {
    pub order_id: String,
    pub status: SwapOrderStatus,
    pub metadata: Option<serde_json::Value>,
}

/// Current state of an order on the venue.
#[derive(Debug, Clone)]
pub struct SwapOrderState {
    pub order_id: String,
    pub status: SwapOrderStatus,
    pub filled_amount_out: Option<Decimal>,
    pub failure_reason: Option<String>,
}

/// One capability set, several interchangeable liquidity venues. Which
/// backend serves it is a construction-time decision made in bootstrap,
/// never a runtime branch in business logic.
#[async_trait]
pub trait SwapProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Whether the backend has the credentials/endpoints it needs.
    fn is_configured(&self) -> bool;

    async fn get_quote(
        &self,
        from_asset: &str,
        to_asset: &str,
        amount_in: Decimal,
    ) -> AppResult<SwapQuote>;

    /// Place an order. Callers must guarantee at-most-once per Transaction
    /// by checking for a recorded order id before calling.
    async fn execute_swap(&self, request: SwapOrderRequest) -> AppResult<SwapOrder>;

    async fn get_swap_status(&self, order_id: &str) -> AppResult<SwapOrderState>;
}
