use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppResult, DepositError};

/// A token transfer observed on chain, amounts already normalized to the
/// token's decimal base by the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub tx_id: String,
    pub log_index: i32,
    pub from_address: String,
    pub amount: Decimal,
    pub block_number: i64,
}

/// Read-only view of a chain, served by an external indexer. The pipeline
/// treats this as a black box; RPC details live behind it.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Transfers of `token_address` into `to_address` within the block window.
    async fn get_transfer_events(
        &self,
        chain_id: i32,
        token_address: &str,
        to_address: &str,
        from_block: i64,
    ) -> AppResult<Vec<TransferEvent>>;

    /// Confirmations accumulated on top of the block containing `tx_id`.
    async fn get_confirmation_depth(&self, chain_id: i32, tx_id: &str) -> AppResult<i64>;

    async fn latest_block(&self, chain_id: i32) -> AppResult<i64>;
}

/// HTTP client against the chain indexer service.
pub struct HttpChainClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TransferEventsResponse {
    events: Vec<TransferEvent>,
}

#[derive(Deserialize)]
struct ConfirmationResponse {
    confirmations: i64,
}

#[derive(Deserialize)]
struct LatestBlockResponse {
    block_number: i64,
}

impl HttpChainClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { base_url, http }
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn get_transfer_events(
        &self,
        chain_id: i32,
        token_address: &str,
        to_address: &str,
        from_block: i64,
    ) -> AppResult<Vec<TransferEvent>> {
        let url = format!("{}/chains/{}/transfers", self.base_url, chain_id);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("token", token_address),
                ("to", to_address),
                ("from_block", &from_block.to_string()),
            ])
            .send()
            .await
            .map_err(|e| DepositError::ChainLookupFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DepositError::ChainLookupFailed(format!(
                "indexer returned {} for {}",
                response.status(),
                url
            ))
            .into());
        }

        let body: TransferEventsResponse = response
            .json()
            .await
            .map_err(|e| DepositError::ChainLookupFailed(e.to_string()))?;

        Ok(body.events)
    }

    async fn get_confirmation_depth(&self, chain_id: i32, tx_id: &str) -> AppResult<i64> {
        let url = format!(
            "{}/chains/{}/transactions/{}/confirmations",
            self.base_url, chain_id, tx_id
        );
        let body: ConfirmationResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DepositError::ChainLookupFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| DepositError::ChainLookupFailed(e.to_string()))?;

        Ok(body.confirmations)
    }

    async fn latest_block(&self, chain_id: i32) -> AppResult<i64> {
        let url = format!("{}/chains/{}/head", self.base_url, chain_id);
        let body: LatestBlockResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DepositError::ChainLookupFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| DepositError::ChainLookupFailed(e.to_string()))?;

        Ok(body.block_number)
    }
}
