use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use crate::error::AppResult;

/// One consumed external event. Entries are permanent; there is no delete.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConsumedEvent {
    pub chain_id: i32,
    pub tx_id: String,
    pub log_index: i32,
    pub consumed_at: DateTime<Utc>,
}

/// The dedup ledger - the single source of truth preventing double-credit.
///
/// Transaction ids are lowercased before storage and comparison, so case
/// variants of the same identifier collide. The unique constraint on
/// `(chain_id, tx_id, log_index)` is the concurrency primitive that
/// arbitrates races between duplicate event deliveries.
pub struct EventDedupLedger {
    pool: PgPool,
}

impl EventDedupLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn is_consumed(
        &self,
        chain_id: i32,
        tx_id: &str,
        log_index: i32,
    ) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM consumed_events
                WHERE chain_id = $1 AND tx_id = $2 AND log_index = $3
            )
            "#,
        )
        .bind(chain_id)
        .bind(tx_id.to_lowercase())
        .bind(log_index)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Idempotent insert-or-ignore. Returns true if this call inserted the
    /// row, false if the triple was already consumed. Both outcomes are
    /// success from the caller's point of view; false arbitrated a race.
    pub async fn mark_consumed(
        &self,
        chain_id: i32,
        tx_id: &str,
        log_index: i32,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO consumed_events (chain_id, tx_id, log_index)
            VALUES ($1, $2, $3)
            ON CONFLICT (chain_id, tx_id, log_index) DO NOTHING
            "#,
        )
        .bind(chain_id)
        .bind(tx_id.to_lowercase())
        .bind(log_index)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Same as `mark_consumed` but inside an open unit of work, so the
    /// dedup entry commits atomically with the settlement it guards.
    pub async fn mark_consumed_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        chain_id: i32,
        tx_id: &str,
        log_index: i32,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO consumed_events (chain_id, tx_id, log_index)
            VALUES ($1, $2, $3)
            ON CONFLICT (chain_id, tx_id, log_index) DO NOTHING
            "#,
        )
        .bind(chain_id)
        .bind(tx_id.to_lowercase())
        .bind(log_index)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Normalization rule for external transaction identifiers: all comparisons
/// are case-insensitive, enforced by lowercasing at the boundary.
pub fn normalize_tx_id(tx_id: &str) -> String {
    tx_id.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_id_normalization_is_case_insensitive() {
        assert_eq!(normalize_tx_id("0xABCdef"), "0xabcdef");
        assert_eq!(normalize_tx_id("0xabcdef"), normalize_tx_id("0xABCDEF"));
    }
}
