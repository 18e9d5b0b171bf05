use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::traits::*;
use crate::error::{AppResult, SwapError};

/// Gasless venue: the user signs an intent, solvers compete in an auction
/// to fill it, and the winning solver pays gas. Fills are slower and can
/// expire unfilled, which surfaces as a terminal failure.
pub struct GaslessIntentProvider {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct IndicativeQuote {
    buy_amount: Decimal,
    price: Decimal,
    quote_deadline: i64,
}

#[derive(Deserialize)]
struct IntentAck {
    intent_uid: String,
    phase: String,
}

#[derive(Deserialize)]
struct IntentStatusBody {
    intent_uid: String,
    phase: String,
    executed_buy_amount: Option<Decimal>,
    cancellation_reason: Option<String>,
}

impl GaslessIntentProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url,
            api_key,
            http,
        }
    }

    /// Auction vocabulary: open | auction | settling | filled | expired | cancelled
    fn map_status(phase: &str) -> AppResult<SwapOrderStatus> {
        match phase {
            "open" => Ok(SwapOrderStatus::Pending),
            "auction" | "settling" => Ok(SwapOrderStatus::Processing),
            "filled" => Ok(SwapOrderStatus::Completed),
            "expired" | "cancelled" => Ok(SwapOrderStatus::Failed),
            other => Err(SwapError::UnknownProviderStatus(other.to_string()).into()),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("X-Api-Key", key);
        }
        builder
    }
}

#[async_trait]
impl SwapProvider for GaslessIntentProvider {
    fn provider_name(&self) -> &'static str {
        "gasless"
    }

    fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && self.api_key.is_some()
    }

    async fn get_quote(
        &self,
        from_asset: &str,
        to_asset: &str,
        amount_in: Decimal,
    ) -> AppResult<SwapQuote> {
        let response = self
            .request(reqwest::Method::POST, "/api/quotes")
            .json(&json!({
                "sell_token": from_asset,
                "buy_token": to_asset,
                "sell_amount": amount_in,
            }))
            .send()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(SwapError::ProviderUnavailable(response.status().to_string()).into());
        }
        let body: IndicativeQuote = response
            .json()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        Ok(SwapQuote {
            from_asset: from_asset.to_string(),
            to_asset: to_asset.to_string(),
            amount_in,
            amount_out: body.buy_amount,
            rate: body.price,
            provider: self.provider_name().to_string(),
            expires_at_unix: body.quote_deadline,
        })
    }

    async fn execute_swap(&self, request: SwapOrderRequest) -> AppResult<SwapOrder> {
        let response = self
            .request(reqwest::Method::POST, "/api/intents")
            .json(&json!({
                "sell_token": request.from_asset,
                "buy_token": request.to_asset,
                "sell_amount": request.amount_in,
                "min_buy_amount": request.min_amount_out,
                "app_ref": request.client_order_ref,
            }))
            .send()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(SwapError::ProviderUnavailable(response.status().to_string()).into());
        }
        let body: IntentAck = response
            .json()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        Ok(SwapOrder {
            status: Self::map_status(&body.phase)?,
            metadata: None,
            order_id: body.intent_uid,
        })
    }

    async fn get_swap_status(&self, order_id: &str) -> AppResult<SwapOrderState> {
        let response = self
            .request(reqwest::Method::GET, &format!("/api/intents/{}", order_id))
            .send()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(SwapError::ProviderUnavailable(response.status().to_string()).into());
        }
        let body: IntentStatusBody = response
            .json()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        Ok(SwapOrderState {
            order_id: body.intent_uid,
            status: Self::map_status(&body.phase)?,
            filled_amount_out: body.executed_buy_amount,
            failure_reason: body.cancellation_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auction_vocabulary_maps_to_shared_enum() {
        assert_eq!(
            GaslessIntentProvider::map_status("open").unwrap(),
            SwapOrderStatus::Pending
        );
        assert_eq!(
            GaslessIntentProvider::map_status("auction").unwrap(),
            SwapOrderStatus::Processing
        );
        assert_eq!(
            GaslessIntentProvider::map_status("settling").unwrap(),
            SwapOrderStatus::Processing
        );
        assert_eq!(
            GaslessIntentProvider::map_status("filled").unwrap(),
            SwapOrderStatus::Completed
        );
        assert_eq!(
            GaslessIntentProvider::map_status("expired").unwrap(),
            SwapOrderStatus::Failed
        );
        assert!(GaslessIntentProvider::map_status("solved").is_err());
    }
}
