use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use uuid::Uuid;

use crate::chain::TransferEvent;
use crate::error::{AppError, AppResult, DepositError, SwapError};

/// Deposit session status state machine
///
/// AwaitingTransfer -> Received -> Confirmed
/// AwaitingTransfer/Received -> Expired | Failed
/// Terminal states never transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "session_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    AwaitingTransfer,
    Received,
    Confirmed,
    Expired,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Confirmed | SessionStatus::Expired | SessionStatus::Failed
        )
    }

    /// Validate a transition. Status only moves forward; there is no path
    /// back to AwaitingTransfer once an event has been bound.
    pub fn validate_transition(from: SessionStatus, to: SessionStatus) -> AppResult<()> {
        let allowed = match from {
            SessionStatus::AwaitingTransfer => vec![
                SessionStatus::Received,
                SessionStatus::Expired,
                SessionStatus::Failed,
            ],
            SessionStatus::Received => vec![SessionStatus::Confirmed, SessionStatus::Failed],
            SessionStatus::Confirmed | SessionStatus::Expired | SessionStatus::Failed => vec![],
        };

        if !allowed.contains(&to) {
            return Err(DepositError::InvalidState {
                current: format!("{:?}", from),
                expected: format!("{:?}", allowed),
            }
            .into());
        }

        Ok(())
    }
}

/// One per user-initiated on-chain deposit intent.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DepositSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_address: String,
    pub chain_id: i32,
    pub token_symbol: String,
    pub token_address: String,
    pub expected_amount: Option<Decimal>,
    pub min_amount: Decimal,
    pub max_amount: Option<Decimal>,
    pub status: SessionStatus,
    // Matched-event fields are all-or-nothing: either every one is set
    // (after the RECEIVED transition) or none is.
    pub matched_tx_id: Option<String>,
    pub matched_log_index: Option<i32>,
    pub matched_from_address: Option<String>,
    pub matched_amount: Option<Decimal>,
    pub matched_block_number: Option<i64>,
    pub created_at_block: i64,
    pub expires_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DepositSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Amount matching policy: inclusive bounds, or exact expected amount
    /// when one was declared. Amounts are assumed normalized to the same
    /// decimal base by the chain client.
    pub fn matches_transfer(&self, event: &TransferEvent) -> bool {
        if let Some(expected) = self.expected_amount {
            return event.amount == expected;
        }
        let above_min = event.amount >= self.min_amount;
        let below_max = self.max_amount.map(|max| event.amount <= max).unwrap_or(true);
        above_min && below_max
    }
}

/// Transaction type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_type", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Deposit,
    Swap,
    Rebalance,
}

/// Transaction status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }

    /// Cannot go COMPLETED without passing through PROCESSING; terminal
    /// states never transition.
    pub fn validate_transition(from: TransactionStatus, to: TransactionStatus) -> AppResult<()> {
        let allowed = match from {
            TransactionStatus::Pending => {
                vec![TransactionStatus::Processing, TransactionStatus::Failed]
            }
            TransactionStatus::Processing => {
                vec![TransactionStatus::Completed, TransactionStatus::Failed]
            }
            TransactionStatus::Completed | TransactionStatus::Failed => vec![],
        };

        if !allowed.contains(&to) {
            return Err(SwapError::InvalidState {
                current: format!("{:?}", from),
                expected: format!("{:?}", allowed),
            }
            .into());
        }

        Ok(())
    }
}

/// The financial ledger row for any money movement (deposit or swap).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub source_asset: String,
    pub source_amount: Decimal,
    pub destination_asset: String,
    pub destination_amount: Option<Decimal>,
    pub usd_value: Decimal,
    /// Target allocation snapshot at intent time
    pub allocation: Option<serde_json::Value>,
    pub payment_ref: Option<String>,
    pub payment_account: Option<String>,
    pub chain_id: Option<i32>,
    pub tx_id: Option<String>,
    pub log_index: Option<i32>,
    pub provider_name: Option<String>,
    pub provider_order_id: Option<String>,
    pub provider_metadata: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Parameters for idempotent on-chain deposit creation.
#[derive(Debug, Clone)]
pub struct NewOnchainDeposit {
    pub user_id: Uuid,
    pub chain_id: i32,
    pub tx_id: String,
    pub log_index: i32,
    pub source_asset: String,
    pub source_amount: Decimal,
    pub destination_asset: String,
    pub usd_value: Decimal,
    pub allocation: Option<serde_json::Value>,
}

/// Parameters for a payment-initiated (mobile-money) deposit.
#[derive(Debug, Clone)]
pub struct NewPaymentDeposit {
    pub user_id: Uuid,
    pub payment_ref: String,
    pub payment_account: String,
    pub source_asset: String,
    pub source_amount: Decimal,
    pub destination_asset: String,
    pub usd_value: Decimal,
    pub allocation: Option<serde_json::Value>,
}

/// Parameters for a swap intent.
#[derive(Debug, Clone)]
pub struct NewSwap {
    pub user_id: Uuid,
    pub source_asset: String,
    pub source_amount: Decimal,
    pub destination_asset: String,
    pub usd_value: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn session_with_window(
        min: Decimal,
        max: Option<Decimal>,
        expected: Option<Decimal>,
    ) -> DepositSession {
        DepositSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            wallet_address: "0xwallet".into(),
            chain_id: 137,
            token_symbol: "USDC".into(),
            token_address: "0xtoken".into(),
            expected_amount: expected,
            min_amount: min,
            max_amount: max,
            status: SessionStatus::AwaitingTransfer,
            matched_tx_id: None,
            matched_log_index: None,
            matched_from_address: None,
            matched_amount: None,
            matched_block_number: None,
            created_at_block: 100,
            expires_at: Utc::now() + chrono::Duration::minutes(60),
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn transfer(amount: Decimal) -> TransferEvent {
        TransferEvent {
            tx_id: "0xabc".into(),
            log_index: 3,
            from_address: "0xsender".into(),
            amount,
            block_number: 120,
        }
    }

    #[test]
    fn session_transitions_only_advance() {
        use SessionStatus::*;

        assert!(SessionStatus::validate_transition(AwaitingTransfer, Received).is_ok());
        assert!(SessionStatus::validate_transition(AwaitingTransfer, Expired).is_ok());
        assert!(SessionStatus::validate_transition(Received, Confirmed).is_ok());
        assert!(SessionStatus::validate_transition(Received, Failed).is_ok());

        // No backward or skipping transitions
        assert!(SessionStatus::validate_transition(Received, AwaitingTransfer).is_err());
        assert!(SessionStatus::validate_transition(Confirmed, Received).is_err());
        assert!(SessionStatus::validate_transition(AwaitingTransfer, Confirmed).is_err());
        assert!(SessionStatus::validate_transition(Expired, Received).is_err());
        assert!(SessionStatus::validate_transition(Received, Expired).is_err());
    }

    #[test]
    fn transaction_transitions_pass_through_processing() {
        use TransactionStatus::*;

        assert!(TransactionStatus::validate_transition(Pending, Processing).is_ok());
        assert!(TransactionStatus::validate_transition(Processing, Completed).is_ok());
        assert!(TransactionStatus::validate_transition(Processing, Failed).is_ok());

        assert!(TransactionStatus::validate_transition(Pending, Completed).is_err());
        assert!(TransactionStatus::validate_transition(Completed, Processing).is_err());
        assert!(TransactionStatus::validate_transition(Failed, Pending).is_err());
    }

    #[test]
    fn amount_window_is_inclusive() {
        let session = session_with_window(dec!(95), Some(dec!(105)), None);

        assert!(session.matches_transfer(&transfer(dec!(100))));
        assert!(session.matches_transfer(&transfer(dec!(95))));
        assert!(session.matches_transfer(&transfer(dec!(105))));
        assert!(!session.matches_transfer(&transfer(dec!(94.999999))));
        assert!(!session.matches_transfer(&transfer(dec!(105.000001))));
    }

    #[test]
    fn expected_amount_takes_precedence() {
        let session = session_with_window(dec!(0), None, Some(dec!(50)));

        assert!(session.matches_transfer(&transfer(dec!(50))));
        assert!(!session.matches_transfer(&transfer(dec!(49))));
        assert!(!session.matches_transfer(&transfer(dec!(51))));
    }

    #[test]
    fn open_ended_window_has_no_upper_bound() {
        let session = session_with_window(dec!(10), None, None);

        assert!(session.matches_transfer(&transfer(dec!(10))));
        assert!(session.matches_transfer(&transfer(dec!(1_000_000))));
        assert!(!session.matches_transfer(&transfer(dec!(9.99))));
    }
}
