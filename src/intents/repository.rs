use chrono::{Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use super::models::*;
use crate::chain::TransferEvent;
use crate::dedup::normalize_tx_id;
use crate::error::{AppResult, DepositError, SwapError};

const SESSION_COLUMNS: &str = r#"
    id, user_id, wallet_address, chain_id, token_symbol, token_address,
    expected_amount, min_amount, max_amount, status, matched_tx_id,
    matched_log_index, matched_from_address, matched_amount,
    matched_block_number, created_at_block, expires_at, failure_reason,
    created_at, updated_at
"#;

const TRANSACTION_COLUMNS: &str = r#"
    id, user_id, tx_type, status, source_asset, source_amount,
    destination_asset, destination_amount, usd_value, allocation,
    payment_ref, payment_account, chain_id, tx_id, log_index,
    provider_name, provider_order_id, provider_metadata, failure_reason,
    failed_at, completed_at, created_at, updated_at
"#;

/// Intent store - owns the DepositSession and Transaction lifecycle.
pub struct IntentRepository {
    pub pool: PgPool,
}

impl IntentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin_tx(&self) -> AppResult<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    // ========== DEPOSIT SESSIONS ==========

    #[allow(clippy::too_many_arguments)]
    pub async fn create_session(
        &self,
        user_id: Uuid,
        wallet_address: &str,
        chain_id: i32,
        token_symbol: &str,
        token_address: &str,
        expected_amount: Option<rust_decimal::Decimal>,
        min_amount: rust_decimal::Decimal,
        max_amount: Option<rust_decimal::Decimal>,
        created_at_block: i64,
        ttl_minutes: i64,
    ) -> AppResult<DepositSession> {
        let expires_at = Utc::now() + Duration::minutes(ttl_minutes);

        let session = sqlx::query_as::<_, DepositSession>(&format!(
            r#"
            INSERT INTO deposit_sessions (
                user_id, wallet_address, chain_id, token_symbol, token_address,
                expected_amount, min_amount, max_amount, created_at_block, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(wallet_address)
        .bind(chain_id)
        .bind(token_symbol)
        .bind(token_address)
        .bind(expected_amount)
        .bind(min_amount)
        .bind(max_amount)
        .bind(created_at_block)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        info!(session_id = %session.id, user_id = %user_id, "Deposit session created");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid) -> AppResult<Option<DepositSession>> {
        let session = sqlx::query_as::<_, DepositSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM deposit_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Bind a matched transfer to a session and advance it to RECEIVED.
    /// The matched-event fields are set together in one statement; the
    /// status guard makes the bind a no-op if another worker got there
    /// first or the session already moved on.
    pub async fn bind_matched_event(
        &self,
        session_id: Uuid,
        event: &TransferEvent,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE deposit_sessions
            SET status = 'received',
                matched_tx_id = $2,
                matched_log_index = $3,
                matched_from_address = $4,
                matched_amount = $5,
                matched_block_number = $6,
                updated_at = NOW()
            WHERE id = $1 AND status = 'awaiting_transfer'
            "#,
        )
        .bind(session_id)
        .bind(normalize_tx_id(&event.tx_id))
        .bind(event.log_index)
        .bind(&event.from_address)
        .bind(event.amount)
        .bind(event.block_number)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Compare-and-set status transition, validated against the state
    /// machine before touching the database.
    pub async fn transition_session(
        &self,
        session_id: Uuid,
        from: SessionStatus,
        to: SessionStatus,
    ) -> AppResult<()> {
        SessionStatus::validate_transition(from, to)?;

        let result = sqlx::query(
            r#"
            UPDATE deposit_sessions
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(session_id)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DepositError::InvalidState {
                current: "unknown".to_string(),
                expected: format!("{:?}", from),
            }
            .into());
        }

        Ok(())
    }

    /// CONFIRMED transition inside an open unit of work, so the session
    /// flip commits atomically with the dedup entry and the reconciliation.
    pub async fn confirm_session_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        session_id: Uuid,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE deposit_sessions
            SET status = 'confirmed', updated_at = NOW()
            WHERE id = $1 AND status = 'received'
            "#,
        )
        .bind(session_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DepositError::InvalidState {
                current: "unknown".to_string(),
                expected: "Received".to_string(),
            }
            .into());
        }

        Ok(())
    }

    pub async fn fail_session(&self, session_id: Uuid, reason: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE deposit_sessions
            SET status = 'failed', failure_reason = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('awaiting_transfer', 'received')
            "#,
        )
        .bind(session_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark overdue AWAITING_TRANSFER sessions EXPIRED. The status guard
    /// makes the sweep single-shot under concurrent callers.
    pub async fn expire_overdue_sessions(&self) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE deposit_sessions
            SET status = 'expired', updated_at = NOW()
            WHERE status = 'awaiting_transfer' AND expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ========== TRANSACTIONS ==========

    pub async fn get_transaction(&self, tx_id: Uuid) -> AppResult<Option<LedgerTransaction>> {
        let tx = sqlx::query_as::<_, LedgerTransaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(tx_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tx)
    }

    pub async fn get_transaction_by_payment_ref(
        &self,
        payment_ref: &str,
    ) -> AppResult<Option<LedgerTransaction>> {
        let tx = sqlx::query_as::<_, LedgerTransaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE payment_ref = $1"
        ))
        .bind(payment_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tx)
    }

    /// Idempotent on-chain deposit creation: a second call with the same
    /// `(chain, tx_id, log_index)` returns the existing row untouched.
    /// The partial unique index on the triple arbitrates concurrent calls.
    pub async fn create_onchain_deposit(
        &self,
        params: NewOnchainDeposit,
    ) -> AppResult<LedgerTransaction> {
        let tx_id = normalize_tx_id(&params.tx_id);

        let inserted = sqlx::query_as::<_, LedgerTransaction>(&format!(
            r#"
            INSERT INTO transactions (
                user_id, tx_type, status, source_asset, source_amount,
                destination_asset, usd_value, allocation, chain_id, tx_id, log_index
            )
            VALUES ($1, 'deposit', 'pending', $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (chain_id, tx_id, log_index) WHERE tx_id IS NOT NULL
            DO NOTHING
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(params.user_id)
        .bind(&params.source_asset)
        .bind(params.source_amount)
        .bind(&params.destination_asset)
        .bind(params.usd_value)
        .bind(&params.allocation)
        .bind(params.chain_id)
        .bind(&tx_id)
        .bind(params.log_index)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(tx) = inserted {
            return Ok(tx);
        }

        // Duplicate create: hand back the original row.
        let existing = sqlx::query_as::<_, LedgerTransaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE chain_id = $1 AND tx_id = $2 AND log_index = $3
            "#
        ))
        .bind(params.chain_id)
        .bind(&tx_id)
        .bind(params.log_index)
        .fetch_one(&self.pool)
        .await?;

        Ok(existing)
    }

    /// Payment-initiated deposit, idempotent by external payment reference.
    pub async fn create_payment_deposit(
        &self,
        params: NewPaymentDeposit,
    ) -> AppResult<LedgerTransaction> {
        let inserted = sqlx::query_as::<_, LedgerTransaction>(&format!(
            r#"
            INSERT INTO transactions (
                user_id, tx_type, status, source_asset, source_amount,
                destination_asset, usd_value, allocation, payment_ref, payment_account
            )
            VALUES ($1, 'deposit', 'pending', $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (payment_ref) WHERE payment_ref IS NOT NULL
            DO NOTHING
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(params.user_id)
        .bind(&params.source_asset)
        .bind(params.source_amount)
        .bind(&params.destination_asset)
        .bind(params.usd_value)
        .bind(&params.allocation)
        .bind(&params.payment_ref)
        .bind(&params.payment_account)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(tx) = inserted {
            return Ok(tx);
        }

        let existing = self
            .get_transaction_by_payment_ref(&params.payment_ref)
            .await?
            .ok_or_else(|| {
                DepositError::SessionNotFound(params.payment_ref.clone())
            })?;

        Ok(existing)
    }

    pub async fn create_swap(&self, params: NewSwap) -> AppResult<LedgerTransaction> {
        let tx = sqlx::query_as::<_, LedgerTransaction>(&format!(
            r#"
            INSERT INTO transactions (
                user_id, tx_type, status, source_asset, source_amount,
                destination_asset, usd_value
            )
            VALUES ($1, 'swap', 'pending', $2, $3, $4, $5)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(params.user_id)
        .bind(&params.source_asset)
        .bind(params.source_amount)
        .bind(&params.destination_asset)
        .bind(params.usd_value)
        .fetch_one(&self.pool)
        .await?;

        info!(transaction_id = %tx.id, user_id = %params.user_id, "Swap intent created");
        Ok(tx)
    }

    /// PENDING -> PROCESSING, compare-and-set. Returns false when another
    /// worker already claimed the transaction.
    pub async fn mark_processing(&self, transaction_id: Uuid) -> AppResult<bool> {
        TransactionStatus::validate_transition(
            TransactionStatus::Pending,
            TransactionStatus::Processing,
        )?;

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(transaction_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record the provider order id exactly once. A second attempt with a
    /// different order id is refused, so a re-run of the execution worker
    /// re-enters polling instead of re-executing.
    pub async fn record_provider_order(
        &self,
        transaction_id: Uuid,
        provider_name: &str,
        provider_order_id: &str,
        provider_metadata: Option<serde_json::Value>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET provider_name = $2, provider_order_id = $3,
                provider_metadata = $4, updated_at = NOW()
            WHERE id = $1 AND provider_order_id IS NULL
            "#,
        )
        .bind(transaction_id)
        .bind(provider_name)
        .bind(provider_order_id)
        .bind(provider_metadata)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SwapError::InvalidState {
                current: "order already recorded".to_string(),
                expected: "no provider order".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Terminal business failure. No effect on an already-completed row.
    pub async fn mark_failed(&self, transaction_id: Uuid, reason: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'failed', failure_reason = $2, failed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(transaction_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// PROCESSING swaps older than the given budget, for the ops sweep.
    pub async fn find_overdue_processing_swaps(
        &self,
        older_than_minutes: i64,
    ) -> AppResult<Vec<LedgerTransaction>> {
        let rows = sqlx::query_as::<_, LedgerTransaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE tx_type = 'swap' AND status = 'processing'
              AND updated_at < NOW() - make_interval(mins => $1)
            "#
        ))
        .bind(older_than_minutes as i32)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
