pub mod math;

use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::dedup::{normalize_tx_id, EventDedupLedger};
use crate::error::{AppError, AppResult, DepositError};
use crate::intents::{IntentRepository, TransactionStatus};
use crate::portfolio::{AssetCategory, PortfolioRepository};
use math::{apply_delta, recompute, TransferDelta};

/// One settled transfer to fold into a user's balances.
#[derive(Debug, Clone)]
pub struct SettledTransfer {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub from_symbol: String,
    pub from_category: AssetCategory,
    pub from_amount: Decimal,
    pub from_usd: Decimal,
    pub to_symbol: String,
    pub to_category: AssetCategory,
    pub to_amount: Decimal,
    pub to_usd: Decimal,
    /// External inflow (deposit) as opposed to an internal reallocation.
    pub is_inflow: bool,
}

/// Reference to the external event being consumed with this settlement.
#[derive(Debug, Clone)]
pub struct EventRef {
    pub chain_id: i32,
    pub tx_id: String,
    pub log_index: i32,
}

/// A settlement unit of work: balance transfers plus the dedup entry and
/// session confirmation that must commit with them.
#[derive(Debug, Clone)]
pub struct SettlementPlan {
    pub transfers: Vec<SettledTransfer>,
    pub consume_event: Option<EventRef>,
    pub confirm_session: Option<Uuid>,
}

impl SettlementPlan {
    pub fn single(transfer: SettledTransfer) -> Self {
        Self {
            transfers: vec![transfer],
            consume_event: None,
            confirm_session: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Applied,
    /// Every transfer was already COMPLETED; nothing changed.
    AlreadyApplied,
}

/// The only writer of Portfolio/Wallet/PortfolioHolding state.
///
/// Everything in `apply` commits in one database transaction: the dedup
/// entry, the portfolio/wallet/holding mutations, the transaction
/// completion, and the session confirmation. A mid-flight failure rolls
/// the whole unit back, and the terminal check on the transaction rows
/// makes a retry of the full unit a no-op where it already committed.
pub struct BalanceReconciler {
    pool: PgPool,
}

impl BalanceReconciler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn apply_completed_transfer(
        &self,
        transfer: SettledTransfer,
    ) -> AppResult<SettlementOutcome> {
        self.apply(SettlementPlan::single(transfer)).await
    }

    pub async fn apply(&self, plan: SettlementPlan) -> AppResult<SettlementOutcome> {
        let user_id = match plan.transfers.first() {
            Some(t) => t.user_id,
            None => return Ok(SettlementOutcome::AlreadyApplied),
        };
        if plan.transfers.iter().any(|t| t.user_id != user_id) {
            return Err(AppError::InvalidInput(
                "settlement batch spans multiple users".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        // Terminal short-circuit: lock each transaction row and drop the
        // ones that already completed, so a retried job applies nothing
        // twice.
        let mut pending = Vec::with_capacity(plan.transfers.len());
        for transfer in &plan.transfers {
            let status = sqlx::query_scalar::<_, TransactionStatus>(
                "SELECT status FROM transactions WHERE id = $1 FOR UPDATE",
            )
            .bind(transfer.transaction_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Transaction {}", transfer.transaction_id))
            })?;

            match status {
                TransactionStatus::Completed => continue,
                TransactionStatus::Failed => {
                    return Err(AppError::BadRequest(format!(
                        "Transaction {} already failed",
                        transfer.transaction_id
                    )));
                }
                TransactionStatus::Pending => {
                    // Rows that skipped their worker's mark_processing step
                    // are promoted here, inside the same transaction, so the
                    // completion update below only ever sees 'processing'.
                    TransactionStatus::validate_transition(
                        TransactionStatus::Pending,
                        TransactionStatus::Processing,
                    )?;
                    sqlx::query(
                        "UPDATE transactions SET status = 'processing', updated_at = NOW() \
                         WHERE id = $1 AND status = 'pending'",
                    )
                    .bind(transfer.transaction_id)
                    .execute(&mut *tx)
                    .await?;
                    pending.push(transfer.clone());
                }
                TransactionStatus::Processing => pending.push(transfer.clone()),
            }
        }

        // Consume the external event. Losing the insert race while our own
        // settlement did not commit means another intent claimed this
        // event: roll back and surface the conflict for ops.
        if let Some(event) = &plan.consume_event {
            let inserted = EventDedupLedger::mark_consumed_in_tx(
                &mut tx,
                event.chain_id,
                &normalize_tx_id(&event.tx_id),
                event.log_index,
            )
            .await?;

            if !inserted && !pending.is_empty() {
                return Err(DepositError::EventAlreadyClaimed.into());
            }
        }

        if pending.is_empty() {
            tx.commit().await?;
            return Ok(SettlementOutcome::AlreadyApplied);
        }

        // Fold deltas into the locked portfolio row, then recompute the
        // derived figures once for the whole batch.
        let mut portfolio = PortfolioRepository::lock_portfolio(&mut tx, user_id).await?;
        for transfer in &pending {
            apply_delta(
                &mut portfolio,
                &TransferDelta {
                    from_category: transfer.from_category,
                    to_category: transfer.to_category,
                    from_usd: transfer.from_usd,
                    to_usd: transfer.to_usd,
                    is_inflow: transfer.is_inflow,
                },
            );
        }
        recompute(&mut portfolio);
        PortfolioRepository::save_portfolio(&mut tx, &portfolio).await?;

        // Mirror the same deltas into the wallet cache and holdings rows.
        for transfer in &pending {
            if transfer.from_category != AssetCategory::Cash {
                PortfolioRepository::adjust_wallet_balance(
                    &mut tx,
                    user_id,
                    transfer.from_category,
                    -transfer.from_amount,
                )
                .await?;
                PortfolioRepository::adjust_holding(
                    &mut tx,
                    user_id,
                    &transfer.from_symbol,
                    transfer.from_category,
                    -transfer.from_amount,
                    -transfer.from_usd,
                )
                .await?;
            }
            PortfolioRepository::adjust_wallet_balance(
                &mut tx,
                user_id,
                transfer.to_category,
                transfer.to_amount,
            )
            .await?;
            PortfolioRepository::adjust_holding(
                &mut tx,
                user_id,
                &transfer.to_symbol,
                transfer.to_category,
                transfer.to_amount,
                transfer.to_usd,
            )
            .await?;
        }

        // Complete the transaction rows with their actual settled amounts.
        // The status guard keeps COMPLETED rows immutable: a later call
        // with different settlement data cannot alter the stored values.
        for transfer in &pending {
            sqlx::query(
                r#"
                UPDATE transactions
                SET status = 'completed', destination_amount = $2, usd_value = $3,
                    completed_at = NOW(), updated_at = NOW()
                WHERE id = $1 AND status = 'processing'
                "#,
            )
            .bind(transfer.transaction_id)
            .bind(transfer.to_amount)
            .bind(transfer.to_usd)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(session_id) = plan.confirm_session {
            IntentRepository::confirm_session_in_tx(&mut tx, session_id).await?;
        }

        tx.commit().await?;

        info!(
            user_id = %user_id,
            transfers = pending.len(),
            "Settlement applied"
        );
        Ok(SettlementOutcome::Applied)
    }
}
