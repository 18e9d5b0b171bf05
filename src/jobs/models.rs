use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use uuid::Uuid;

/// The four logical task types of the settlement pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "job_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    DepositCompletion,
    OnchainDepositConfirmation,
    SwapExecution,
    SwapConfirmation,
}

impl JobKind {
    /// RPC-heavy kinds get the tighter concurrency limit.
    pub fn is_heavy(&self) -> bool {
        matches!(
            self,
            JobKind::OnchainDepositConfirmation | JobKind::SwapConfirmation
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// A durable queue entry.
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub job_key: String,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: DateTime<Utc>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn past_deadline(&self) -> bool {
        self.deadline_at.map(|d| d <= Utc::now()).unwrap_or(false)
    }

    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> crate::error::AppResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// A job to enqueue. `job_key` is deterministic per entity, so duplicate
/// submissions collapse inside the queue itself.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: JobKind,
    pub job_key: String,
    pub payload: serde_json::Value,
    pub max_attempts: i32,
    pub delay: Option<chrono::Duration>,
    pub deadline_at: Option<DateTime<Utc>>,
}

// Job payloads, one per task type.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCompletionPayload {
    pub payment_ref: String,
}

impl DepositCompletionPayload {
    pub fn job_key(&self) -> String {
        format!("deposit-completion:{}", self.payment_ref)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnchainConfirmationPayload {
    pub session_id: Uuid,
}

impl OnchainConfirmationPayload {
    pub fn job_key(&self) -> String {
        format!("onchain-confirmation:{}", self.session_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapExecutionPayload {
    pub transaction_id: Uuid,
}

impl SwapExecutionPayload {
    pub fn job_key(&self) -> String {
        format!("swap-execution:{}", self.transaction_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfirmationPayload {
    pub transaction_id: Uuid,
}

impl SwapConfirmationPayload {
    pub fn job_key(&self) -> String {
        format!("swap-confirmation:{}", self.transaction_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_keys_are_deterministic_per_entity() {
        let id = Uuid::new_v4();
        let a = SwapExecutionPayload { transaction_id: id };
        let b = SwapExecutionPayload { transaction_id: id };
        assert_eq!(a.job_key(), b.job_key());

        // Different stages of one entity never collide
        let c = SwapConfirmationPayload { transaction_id: id };
        assert_ne!(a.job_key(), c.job_key());
    }

    #[test]
    fn deadline_check() {
        let mut job = Job {
            id: Uuid::new_v4(),
            job_key: "k".into(),
            kind: JobKind::SwapConfirmation,
            payload: serde_json::json!({}),
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: 5,
            run_at: Utc::now(),
            deadline_at: None,
            locked_at: None,
            locked_by: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!job.past_deadline());

        job.deadline_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(job.past_deadline());

        job.deadline_at = Some(Utc::now() + chrono::Duration::minutes(5));
        assert!(!job.past_deadline());
    }
}
