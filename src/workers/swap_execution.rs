use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::error::{AppResult, SwapError};
use crate::intents::IntentRepository;
use crate::jobs::{
    Job, JobHandler, JobKind, JobOutcome, JobQueue, NewJob, SwapConfirmationPayload,
    SwapExecutionPayload,
};
use crate::providers::{SwapOrderRequest, SwapOrderStatus, SwapProvider};

/// Tolerated slippage between the quoted and the executed rate, as a
/// fraction of the quoted amount out.
const SLIPPAGE_TOLERANCE_BPS: i64 = 50;

const SWAP_MAX_ATTEMPTS: i32 = 10;

/// Places swap orders with the configured liquidity venue, exactly once
/// per transaction. The `client_order_ref` (the transaction id) makes the
/// placement idempotent on the venue side; the recorded provider order id
/// makes it idempotent on ours.
pub struct SwapExecutionHandler {
    repo: Arc<IntentRepository>,
    provider: Arc<dyn SwapProvider>,
    queue: Arc<JobQueue>,
}

impl SwapExecutionHandler {
    pub fn new(
        repo: Arc<IntentRepository>,
        provider: Arc<dyn SwapProvider>,
        queue: Arc<JobQueue>,
    ) -> Self {
        Self {
            repo,
            provider,
            queue,
        }
    }

    async fn enqueue_confirmation(&self, transaction_id: uuid::Uuid) -> AppResult<()> {
        let payload = SwapConfirmationPayload { transaction_id };
        self.queue
            .enqueue(NewJob {
                kind: JobKind::SwapConfirmation,
                job_key: payload.job_key(),
                payload: serde_json::to_value(&payload)
                    .map_err(|e| crate::error::AppError::Internal(e.to_string()))?,
                max_attempts: SWAP_MAX_ATTEMPTS,
                delay: None,
                deadline_at: None,
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for SwapExecutionHandler {
    fn kind(&self) -> JobKind {
        JobKind::SwapExecution
    }

    async fn run(&self, job: &Job) -> AppResult<JobOutcome> {
        let payload: SwapExecutionPayload = job.payload_as()?;

        let tx = self
            .repo
            .get_transaction(payload.transaction_id)
            .await?
            .ok_or_else(|| SwapError::NotFound(payload.transaction_id.to_string()))?;

        if tx.is_terminal() {
            return Ok(JobOutcome::Completed);
        }

        // Already placed on a previous (crashed) run: skip straight to
        // confirmation polling, never re-execute.
        if tx.provider_order_id.is_some() {
            self.enqueue_confirmation(tx.id).await?;
            return Ok(JobOutcome::Completed);
        }

        if !self.provider.is_configured() {
            return Err(SwapError::ProviderUnavailable(format!(
                "{} is not configured",
                self.provider.provider_name()
            ))
            .into());
        }

        let _ = self.repo.mark_processing(tx.id).await?;

        let quote = self
            .provider
            .get_quote(&tx.source_asset, &tx.destination_asset, tx.source_amount)
            .await?;
        let min_amount_out = min_out(quote.amount_out, SLIPPAGE_TOLERANCE_BPS);

        let order = self
            .provider
            .execute_swap(SwapOrderRequest {
                from_asset: tx.source_asset.clone(),
                to_asset: tx.destination_asset.clone(),
                amount_in: tx.source_amount,
                min_amount_out,
                client_order_ref: tx.id.to_string(),
            })
            .await?;

        self.repo
            .record_provider_order(
                tx.id,
                self.provider.provider_name(),
                &order.order_id,
                order.metadata.clone(),
            )
            .await?;

        info!(
            transaction_id = %tx.id,
            order_id = %order.order_id,
            provider = self.provider.provider_name(),
            "Swap order placed"
        );

        if order.status == SwapOrderStatus::Failed {
            self.repo
                .mark_failed(tx.id, "provider rejected order at placement")
                .await?;
            return Ok(JobOutcome::Completed);
        }

        self.enqueue_confirmation(tx.id).await?;
        Ok(JobOutcome::Completed)
    }
}

fn min_out(quoted: Decimal, tolerance_bps: i64) -> Decimal {
    quoted * (Decimal::from(10_000 - tolerance_bps) / Decimal::from(10_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn min_out_applies_slippage_tolerance() {
        assert_eq!(min_out(dec!(100), 50), dec!(99.5));
        assert_eq!(min_out(dec!(200), 100), dec!(198));
        // Zero tolerance passes the quote through
        assert_eq!(min_out(dec!(42.5), 0), dec!(42.5));
    }
}
