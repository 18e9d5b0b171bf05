use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::catalog::AssetCatalog;
use crate::error::AppResult;
use crate::intents::IntentRepository;
use crate::jobs::{DepositCompletionPayload, Job, JobHandler, JobKind, JobOutcome};
use crate::reconciler::{BalanceReconciler, SettledTransfer};

/// Settles payment-initiated deposits (mobile money, bank transfer). The
/// payment provider has already moved the fiat by the time this runs; the
/// job's only work is crediting the ledger, so it is light and fast.
pub struct DepositCompletionHandler {
    repo: Arc<IntentRepository>,
    reconciler: Arc<BalanceReconciler>,
    catalog: Arc<AssetCatalog>,
}

impl DepositCompletionHandler {
    pub fn new(
        repo: Arc<IntentRepository>,
        reconciler: Arc<BalanceReconciler>,
        catalog: Arc<AssetCatalog>,
    ) -> Self {
        Self {
            repo,
            reconciler,
            catalog,
        }
    }
}

#[async_trait]
impl JobHandler for DepositCompletionHandler {
    fn kind(&self) -> JobKind {
        JobKind::DepositCompletion
    }

    async fn run(&self, job: &Job) -> AppResult<JobOutcome> {
        let payload: DepositCompletionPayload = job.payload_as()?;

        let tx = match self
            .repo
            .get_transaction_by_payment_ref(&payload.payment_ref)
            .await?
        {
            Some(tx) => tx,
            // The webhook creates the row before enqueueing; a miss here
            // is replica lag and resolves on retry.
            None => {
                return Err(crate::error::AppError::Internal(format!(
                    "no transaction for payment ref {}",
                    payload.payment_ref
                )))
            }
        };

        if tx.is_terminal() {
            return Ok(JobOutcome::Completed);
        }

        // Category resolution failing is a validation error: record it on
        // the transaction and stop, a replay cannot succeed.
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

        // False means another run already claimed it; the reconciler's
        // terminal check keeps the credit single-shot either way.
        let _ = self.repo.mark_processing(tx.id).await?;

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
                to_amount: tx.destination_amount.unwrap_or(tx.usd_value),
                to_usd: tx.usd_value,
                is_inflow: true,
            })
            .await?;

        info!(payment_ref = %payload.payment_ref, transaction_id = %tx.id, "Payment deposit settled");
        Ok(JobOutcome::Completed)
    }
}
