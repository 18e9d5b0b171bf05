use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::traits::*;
use crate::error::{AppResult, SwapError};

/// Gas-paid venue: orders execute immediately against on-chain liquidity,
/// the venue fronting gas and billing it into the rate.
pub struct GasPaidSwapProvider {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct QuoteResponse {
    amount_out: Decimal,
    rate: Decimal,
    valid_until: i64,
}

#[derive(Deserialize)]
struct OrderResponse {
    order_id: String,
    state: String,
    tx_hash: Option<String>,
}

#[derive(Deserialize)]
struct OrderStatusResponse {
    order_id: String,
    state: String,
    amount_out: Option<Decimal>,
    error: Option<String>,
}

impl GasPaidSwapProvider {
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

    /// Venue vocabulary: created | routing | executing | executed | reverted | rejected
    fn map_status(state: &str) -> AppResult<SwapOrderStatus> {
        match state {
            "created" => Ok(SwapOrderStatus::Pending),
            "routing" | "executing" => Ok(SwapOrderStatus::Processing),
            "executed" => Ok(SwapOrderStatus::Completed),
            "reverted" | "rejected" => Ok(SwapOrderStatus::Failed),
            other => Err(SwapError::UnknownProviderStatus(other.to_string()).into()),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl SwapProvider for GasPaidSwapProvider {
    fn provider_name(&self) -> &'static str {
        "gas_paid"
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
            .request(reqwest::Method::GET, "/v1/quote")
            .query(&[
                ("from", from_asset),
                ("to", to_asset),
                ("amount", &amount_in.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(SwapError::ProviderUnavailable(response.status().to_string()).into());
        }
        let body: QuoteResponse = response
            .json()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        Ok(SwapQuote {
            from_asset: from_asset.to_string(),
            to_asset: to_asset.to_string(),
            amount_in,
            amount_out: body.amount_out,
            rate: body.rate,
            provider: self.provider_name().to_string(),
            expires_at_unix: body.valid_until,
        })
    }

    async fn execute_swap(&self, request: SwapOrderRequest) -> AppResult<SwapOrder> {
        let response = self
            .request(reqwest::Method::POST, "/v1/orders")
            .json(&json!({
                "from": request.from_asset,
                "to": request.to_asset,
                "amount_in": request.amount_in,
                "min_amount_out": request.min_amount_out,
                "client_ref": request.client_order_ref,
            }))
            .send()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(SwapError::ProviderUnavailable(response.status().to_string()).into());
        }
        let body: OrderResponse = response
            .json()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        Ok(SwapOrder {
            status: Self::map_status(&body.state)?,
            metadata: Some(json!({
                "tx_hash": body.tx_hash,
                "placed_at": Utc::now().to_rfc3339(),
            })),
            order_id: body.order_id,
        })
    }

    async fn get_swap_status(&self, order_id: &str) -> AppResult<SwapOrderState> {
        let response = self
            .request(reqwest::Method::GET, &format!("/v1/orders/{}", order_id))
            .send()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        if response.status().is_server_error() {
            return Err(SwapError::ProviderUnavailable(response.status().to_string()).into());
        }
        let body: OrderStatusResponse = response
            .json()
            .await
            .map_err(|e| SwapError::ProviderUnavailable(e.to_string()))?;

        Ok(SwapOrderState {
            order_id: body.order_id,
            status: Self::map_status(&body.state)?,
            filled_amount_out: body.amount_out,
            failure_reason: body.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_vocabulary_maps_to_shared_enum() {
        assert_eq!(
            GasPaidSwapProvider::map_status("created").unwrap(),
            SwapOrderStatus::Pending
        );
        assert_eq!(
            GasPaidSwapProvider::map_status("routing").unwrap(),
            SwapOrderStatus::Processing
        );
        assert_eq!(
            GasPaidSwapProvider::map_status("executed").unwrap(),
            SwapOrderStatus::Completed
        );
        assert_eq!(
            GasPaidSwapProvider::map_status("reverted").unwrap(),
            SwapOrderStatus::Failed
        );
        assert!(GasPaidSwapProvider::map_status("warming_up").is_err());
    }
}
