use sqlx::{PgPool, Type};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppResult;

/// Conditions the pipeline records for operators instead of resolving on
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "alert_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Two intents raced for one external event; the loser needs a human.
    DualClaimConflict,
    /// A job ran out of retry attempts and was parked.
    RetryExhausted,
    /// A running job lost its worker and was re-queued.
    JobStalled,
    /// A swap sat in PROCESSING beyond its wall-clock budget.
    SwapOverdue,
}

pub struct OpsAlertStore {
    pool: PgPool,
}

impl OpsAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        kind: AlertKind,
        entity_id: Option<Uuid>,
        details: serde_json::Value,
    ) -> AppResult<()> {
        warn!(?kind, ?entity_id, %details, "Ops alert raised");

        sqlx::query(
            r#"
            INSERT INTO ops_alerts (kind, entity_id, details)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(kind)
        .bind(entity_id)
        .bind(details)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
