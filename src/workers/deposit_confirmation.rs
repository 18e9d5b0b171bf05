use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::alerts::{AlertKind, OpsAlertStore};
use crate::catalog::AssetCatalog;
use crate::chain::ChainClient;
use crate::dedup::EventDedupLedger;
use crate::error::{AppError, AppResult, DepositError};
use crate::intents::{
    DepositSession, IntentRepository, LedgerTransaction, NewOnchainDeposit, SessionStatus,
    TransactionStatus,
};
use crate::jobs::{Job, JobHandler, JobKind, JobOutcome, OnchainConfirmationPayload};
use crate::reconciler::{BalanceReconciler, EventRef, SettledTransfer, SettlementPlan};

/// Drives a deposit session through its life: scan the chain for a
/// matching transfer, wait out the confirmation depth, then settle. One
/// repeating job per session; the handler reschedules itself until the
/// session reaches a terminal state.
pub struct DepositConfirmationHandler {
    repo: Arc<IntentRepository>,
    dedup: Arc<EventDedupLedger>,
    chain: Arc<dyn ChainClient>,
    reconciler: Arc<BalanceReconciler>,
    catalog: Arc<AssetCatalog>,
    alerts: OpsAlertStore,
    required_depth: i64,
    poll_interval: Duration,
}

impl DepositConfirmationHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<IntentRepository>,
        dedup: Arc<EventDedupLedger>,
        chain: Arc<dyn ChainClient>,
        reconciler: Arc<BalanceReconciler>,
        catalog: Arc<AssetCatalog>,
        alerts: OpsAlertStore,
        required_depth: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            repo,
            dedup,
            chain,
            reconciler,
            catalog,
            alerts,
            required_depth,
            poll_interval,
        }
    }

    /// Scan the session's block window for a transfer that fits its amount
    /// policy and has not been consumed by anyone else.
    async fn try_match(&self, session: &DepositSession) -> AppResult<bool> {
        let events = self
            .chain
            .get_transfer_events(
                session.chain_id,
                &session.token_address,
                &session.wallet_address,
                session.created_at_block,
            )
            .await?;

        for event in events {
            if !session.matches_transfer(&event) {
                continue;
            }
            if self
                .dedup
                .is_consumed(session.chain_id, &event.tx_id, event.log_index)
                .await?
            {
                continue;
            }

            if self.repo.bind_matched_event(session.id, &event).await? {
                info!(
                    session_id = %session.id,
                    tx_id = %event.tx_id,
                    log_index = event.log_index,
                    "Transfer matched to deposit session"
                );
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// The matched event is final; settle in one unit of work.
    async fn settle(&self, session: &DepositSession) -> AppResult<JobOutcome> {
        // RECEIVED implies every matched field is set.
        let (tx_id, log_index, amount) = match (
            &session.matched_tx_id,
            session.matched_log_index,
            session.matched_amount,
        ) {
            (Some(tx_id), Some(log_index), Some(amount)) => (tx_id.clone(), log_index, amount),
            _ => {
                return Ok(JobOutcome::Park(format!(
                    "session {} is received but missing matched-event fields",
                    session.id
                )))
            }
        };

        let category = match self.catalog.get_asset_category(&session.token_symbol) {
            Ok(category) => category,
            Err(e) if !e.is_transient() => {
                self.repo.fail_session(session.id, &e.to_string()).await?;
                return Ok(JobOutcome::Park(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        // Deposited tokens are USD-pegged (the catalog's Cash bucket), so
        // the settled amount is the USD value.
        let tx = self
            .repo
            .create_onchain_deposit(NewOnchainDeposit {
                user_id: session.user_id,
                chain_id: session.chain_id,
                tx_id: tx_id.clone(),
                log_index,
                source_asset: session.token_symbol.clone(),
                source_amount: amount,
                destination_asset: session.token_symbol.clone(),
                usd_value: amount,
                allocation: None,
            })
            .await?;

        // The idempotent create can hand back a terminal row. A COMPLETED
        // one that did not confirm this session belongs to another
        // session's settlement: this session lost the claim race before
        // our own settlement started. Surface it the same way as an
        // in-flight loss.
        if tx.is_terminal() {
            if event_settled_elsewhere(&tx, session) {
                warn!(
                    session_id = %session.id,
                    tx_id = %tx_id,
                    winning_transaction_id = %tx.id,
                    "Transfer event already settled by another session"
                );
                self.alerts
                    .record(
                        AlertKind::DualClaimConflict,
                        Some(session.id),
                        serde_json::json!({
                            "chain_id": session.chain_id,
                            "tx_id": tx_id,
                            "log_index": log_index,
                            "winning_transaction_id": tx.id,
                            "winning_user_id": tx.user_id,
                        }),
                    )
                    .await?;
            }
            return Ok(JobOutcome::Completed);
        }

        let _ = self.repo.mark_processing(tx.id).await?;

        let plan = SettlementPlan {
            transfers: vec![SettledTransfer {
                transaction_id: tx.id,
                user_id: session.user_id,
                from_symbol: session.token_symbol.clone(),
                from_category: category,
                from_amount: amount,
                from_usd: amount,
                to_symbol: session.token_symbol.clone(),
                to_category: category,
                to_amount: amount,
                to_usd: amount,
                is_inflow: true,
            }],
            consume_event: Some(EventRef {
                chain_id: session.chain_id,
                tx_id: tx_id.clone(),
                log_index,
            }),
            confirm_session: Some(session.id),
        };

        match self.reconciler.apply(plan).await {
            Ok(_) => {
                info!(session_id = %session.id, transaction_id = %tx.id, "Deposit confirmed and settled");
                Ok(JobOutcome::Completed)
            }
            // Lost the dedup race: another session claimed this event
            // between our scan and our settlement. The session stays
            // RECEIVED for an operator to untangle; retrying cannot help.
            Err(AppError::Deposit(DepositError::EventAlreadyClaimed)) => {
                warn!(session_id = %session.id, tx_id = %tx_id, "Transfer event claimed by another session");
                self.repo
                    .mark_failed(tx.id, "transfer event claimed by another session")
                    .await?;
                self.alerts
                    .record(
                        AlertKind::DualClaimConflict,
                        Some(session.id),
                        serde_json::json!({
                            "chain_id": session.chain_id,
                            "tx_id": tx_id,
                            "log_index": log_index,
                            "transaction_id": tx.id,
                        }),
                    )
                    .await?;
                Ok(JobOutcome::Completed)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl JobHandler for DepositConfirmationHandler {
    fn kind(&self) -> JobKind {
        JobKind::OnchainDepositConfirmation
    }

    async fn run(&self, job: &Job) -> AppResult<JobOutcome> {
        let payload: OnchainConfirmationPayload = job.payload_as()?;

        let session = match self.repo.get_session(payload.session_id).await? {
            Some(session) => session,
            None => {
                return Ok(JobOutcome::Park(format!(
                    "deposit session {} does not exist",
                    payload.session_id
                )))
            }
        };

        match session.status {
            status if status.is_terminal() => Ok(JobOutcome::Completed),

            SessionStatus::AwaitingTransfer => {
                if session.is_expired() {
                    self.repo
                        .transition_session(
                            session.id,
                            SessionStatus::AwaitingTransfer,
                            SessionStatus::Expired,
                        )
                        .await?;
                    info!(session_id = %session.id, "Deposit session expired");
                    return Ok(JobOutcome::Completed);
                }

                self.try_match(&session).await?;
                // Whether or not a transfer bound, come back next tick:
                // either to scan again or to start counting confirmations.
                Ok(JobOutcome::RescheduleAfter(self.poll_interval))
            }

            SessionStatus::Received => {
                let tx_id = match &session.matched_tx_id {
                    Some(tx_id) => tx_id.clone(),
                    None => {
                        return Ok(JobOutcome::Park(format!(
                            "session {} is received without a matched tx",
                            session.id
                        )))
                    }
                };

                let depth = self
                    .chain
                    .get_confirmation_depth(session.chain_id, &tx_id)
                    .await?;

                if depth < self.required_depth {
                    return Ok(JobOutcome::RescheduleAfter(self.poll_interval));
                }

                self.settle(&session).await
            }

            // is_terminal() above covers the rest
            _ => Ok(JobOutcome::Completed),
        }
    }
}

/// True when the idempotent create returned a settlement that is not ours.
/// Our own settlement confirms the session in the same commit that
/// completes the transaction, so a COMPLETED row alongside an unconfirmed
/// session can only come from a competing claim.
fn event_settled_elsewhere(tx: &LedgerTransaction, session: &DepositSession) -> bool {
    tx.status == TransactionStatus::Completed && session.status != SessionStatus::Confirmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn received_session() -> DepositSession {
        DepositSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            wallet_address: "0xwallet".into(),
            chain_id: 137,
            token_symbol: "USDC".into(),
            token_address: "0xtoken".into(),
            expected_amount: None,
            min_amount: dec!(1),
            max_amount: None,
            status: SessionStatus::Received,
            matched_tx_id: Some("0xabc".into()),
            matched_log_index: Some(3),
            matched_from_address: Some("0xsender".into()),
            matched_amount: Some(dec!(100)),
            matched_block_number: Some(120),
            created_at_block: 100,
            expires_at: Utc::now() + chrono::Duration::minutes(60),
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn transaction_with_status(
        user_id: Uuid,
        status: TransactionStatus,
    ) -> LedgerTransaction {
        LedgerTransaction {
            id: Uuid::new_v4(),
            user_id,
            tx_type: crate::intents::TransactionType::Deposit,
            status,
            source_asset: "USDC".into(),
            source_amount: dec!(100),
            destination_asset: "USDC".into(),
            destination_amount: Some(dec!(100)),
            usd_value: dec!(100),
            allocation: None,
            payment_ref: None,
            payment_account: None,
            chain_id: Some(137),
            tx_id: Some("0xabc".into()),
            log_index: Some(3),
            provider_name: None,
            provider_order_id: None,
            provider_metadata: None,
            failure_reason: None,
            failed_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn completed_row_with_unconfirmed_session_is_a_foreign_settlement() {
        let session = received_session();
        // Another session (even another user) already settled this event
        let winner = transaction_with_status(Uuid::new_v4(), TransactionStatus::Completed);
        assert!(event_settled_elsewhere(&winner, &session));

        // Same user racing themselves across two sessions still conflicts
        let same_user = transaction_with_status(session.user_id, TransactionStatus::Completed);
        assert!(event_settled_elsewhere(&same_user, &session));
    }

    #[test]
    fn failed_or_live_rows_are_not_conflicts() {
        let session = received_session();

        // A FAILED row is this session's own earlier loss, already surfaced
        let failed = transaction_with_status(session.user_id, TransactionStatus::Failed);
        assert!(!event_settled_elsewhere(&failed, &session));

        let pending = transaction_with_status(session.user_id, TransactionStatus::Pending);
        assert!(!event_settled_elsewhere(&pending, &session));
    }

    #[test]
    fn confirmed_session_owns_its_completed_row() {
        let mut session = received_session();
        session.status = SessionStatus::Confirmed;
        let own = transaction_with_status(session.user_id, TransactionStatus::Completed);
        assert!(!event_settled_elsewhere(&own, &session));
    }
}
