use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::catalog::AssetCatalog;
use crate::error::{AppResult, SwapError};
use crate::intents::IntentRepository;
use crate::jobs::{Job, JobHandler, JobKind, JobOutcome, SwapConfirmationPayload};
use crate::providers::{SwapOrderStatus, SwapProvider};
use crate::reconciler::{BalanceReconciler, SettledTransfer};

/// Polls the venue for a placed order and settles the balances once it
/// fills. Terminal venue failures mark the transaction FAILED; balances
/// stay untouched since nothing ever moved.
pub struct SwapConfirmationHandler {
    repo: Arc<IntentRepository>,
    provider: Arc<dyn SwapProvider>,
    reconciler: Arc<BalanceReconciler>,
    catalog: Arc<AssetCatalog>,
    poll_interval: Duration,
}

impl SwapConfirmationHandler {
    pub fn new(
        repo: Arc<IntentRepository>,
        provider: Arc<dyn SwapProvider>,
        reconciler: Arc<BalanceReconciler>,
        catalog: Arc<AssetCatalog>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            repo,
            provider,
            reconciler,
            catalog,
            poll_interval,
        }
    }
}

#[async_trait]
impl JobHandler for SwapConfirmationHandler {
    fn kind(&self) -> JobKind {
        JobKind::SwapConfirmation
    }

    async fn run(&self, job: &Job) -> AppResult<JobOutcome> {
        let payload: SwapConfirmationPayload = job.payload_as()?;

        let tx = self
            .repo
            .get_transaction(payload.transaction_id)
            .await?
            .ok_or_else(|| SwapError::NotFound(payload.transaction_id.to_string()))?;

        if tx.is_terminal() {
            return Ok(JobOutcome::Completed);
        }

        let order_id = match &tx.provider_order_id {
            Some(order_id) => order_id.clone(),
            None => {
                return Ok(JobOutcome::Park(format!(
                    "transaction {} has no provider order to poll",
                    tx.id
                )))
            }
        };

        let state = self.provider.get_swap_status(&order_id).await?;

        match state.status {
            SwapOrderStatus::Pending | SwapOrderStatus::Processing => {
                Ok(JobOutcome::RescheduleAfter(self.poll_interval))
            }

            SwapOrderStatus::Failed => {
                let reason = state
                    .failure_reason
                    .unwrap_or_else(|| "provider reported failure".to_string());
                self.repo.mark_failed(tx.id, &reason).await?;
                info!(transaction_id = %tx.id, order_id = %order_id, reason = %reason, "Swap failed at venue");
                Ok(JobOutcome::Completed)
            }

            SwapOrderStatus::Completed => {
                let filled = state.filled_amount_out.ok_or_else(|| {
                    SwapError::UnknownProviderStatus(format!(
                        "order {} completed without a fill amount",
                        order_id
                    ))
                })?;

                let categories = self
                    .catalog
                    .get_asset_category(&tx.source_asset)
                    .and_then(|from| {
                        let to = self.catalog.get_asset_category(&tx.destination_asset)?;
                        Ok((from, to))
                    });
                let (from_category, to_category) = match categories {
                    Ok(pair) => pair,
                    Err(e) if !e.is_transient() => {
                        self.repo.mark_failed(tx.id, &e.to_string()).await?;
                        return Ok(JobOutcome::Park(e.to_string()));
                    }
                    Err(e) => return Err(e),
                };

                self.reconciler
                    .apply_completed_transfer(SettledTransfer {
                        transaction_id: tx.id,
                        user_id: tx.user_id,
                        from_symbol: tx.source_asset.clone(),
                        from_category,
                        from_amount: tx.source_amount,
                        from_usd: tx.usd_value,
                        to_symbol: tx.destination_asset.clone(),
                        to_category,
                        to_amount: filled,
                        to_usd: tx.usd_value,
                        is_inflow: false,
                    })
                    .await?;

                info!(transaction_id = %tx.id, order_id = %order_id, "Swap settled");
                Ok(JobOutcome::Completed)
            }
        }
    }
}
