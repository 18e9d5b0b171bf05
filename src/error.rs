use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Deposit error: {0}")]
    Deposit(#[from] DepositError),

    #[error("Swap error: {0}")]
    Swap(#[from] SwapError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported asset: {0}")]
    UnsupportedAsset(String),

    #[error("External error: {0}")]
    External(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// Retry classification for job workers. Anything not explicitly
    /// validation- or business-terminal is treated as transient and
    /// retried up to the attempt cap.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(_) | AppError::External(_) | AppError::Internal(_) => true,
            AppError::Job(JobError::Stalled(_)) => true,
            AppError::Swap(SwapError::ProviderUnavailable(_)) => true,
            AppError::InvalidInput(_)
            | AppError::UnsupportedAsset(_)
            | AppError::BadRequest(_)
            | AppError::NotFound(_)
            | AppError::Config(_) => false,
            AppError::Deposit(e) => e.is_transient(),
            AppError::Swap(_) | AppError::Job(_) => false,
        }
    }
}

/// Deposit pipeline errors
#[derive(Error, Debug)]
pub enum DepositError {
    #[error("Deposit session not found: {0}")]
    SessionNotFound(String),

    #[error("Session in invalid state: {current}, expected: {expected}")]
    InvalidState { current: String, expected: String },

    #[error("Amount {amount} outside accepted window [{min}, {max}]")]
    AmountOutOfBounds {
        amount: String,
        min: String,
        max: String,
    },

    #[error("Event already claimed by another session")]
    EventAlreadyClaimed,

    #[error("Chain lookup failed: {0}")]
    ChainLookupFailed(String),
}

impl DepositError {
    fn is_transient(&self) -> bool {
        matches!(self, DepositError::ChainLookupFailed(_))
    }
}

/// Swap execution errors
#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Swap transaction not found: {0}")]
    NotFound(String),

    #[error("Transaction in invalid state: {current}, expected: {expected}")]
    InvalidState { current: String, expected: String },

    #[error("Provider {0} is not configured")]
    NotConfigured(String),

    #[error("Provider temporarily unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Provider reported order failed: {0}")]
    OrderFailed(String),

    #[error("Unknown provider status: {0}")]
    UnknownProviderStatus(String),
}

/// Job queue errors
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job payload malformed: {0}")]
    MalformedPayload(String),

    #[error("Job stalled: {0}")]
    Stalled(String),

    #[error("Retry attempts exhausted after {0} tries")]
    AttemptsExhausted(i32),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Deposit(DepositError::SessionNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                format!("Deposit session not found: {}", id),
            ),
            AppError::Deposit(DepositError::AmountOutOfBounds { amount, min, max }) => (
                StatusCode::BAD_REQUEST,
                "AMOUNT_OUT_OF_BOUNDS",
                format!("Amount {} outside accepted window [{}, {}]", amount, min, max),
            ),
            AppError::Swap(SwapError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "SWAP_NOT_FOUND",
                format!("Swap transaction not found: {}", id),
            ),
            AppError::Swap(SwapError::NotConfigured(name)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "PROVIDER_NOT_CONFIGURED",
                format!("Swap provider {} is not configured", name),
            ),
            AppError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone())
            }
            AppError::UnsupportedAsset(symbol) => (
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_ASSET",
                format!("Unsupported asset: {}", symbol),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::External(format!("HTTP request error: {:?}", error))
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Job(JobError::MalformedPayload(error.to_string()))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(AppError::External("rpc timeout".into()).is_transient());
        assert!(AppError::Deposit(DepositError::ChainLookupFailed("503".into())).is_transient());
        assert!(AppError::Swap(SwapError::ProviderUnavailable("502".into())).is_transient());

        assert!(!AppError::InvalidInput("bad amount".into()).is_transient());
        assert!(!AppError::Swap(SwapError::OrderFailed("expired".into())).is_transient());
        assert!(!AppError::Deposit(DepositError::EventAlreadyClaimed).is_transient());
    }
}
