use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use uuid::Uuid;

/// Portfolio bucket an asset contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "asset_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    Cash,
    StableYield,
    Equity,
    Gold,
    Crypto,
}

impl AssetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Cash => "cash",
            AssetCategory::StableYield => "stable_yield",
            AssetCategory::Equity => "equity",
            AssetCategory::Gold => "gold",
            AssetCategory::Crypto => "crypto",
        }
    }

    pub fn all() -> [AssetCategory; 5] {
        [
            AssetCategory::Cash,
            AssetCategory::StableYield,
            AssetCategory::Equity,
            AssetCategory::Gold,
            AssetCategory::Crypto,
        ]
    }
}

/// Aggregated per-user portfolio state.
///
/// Invariant, re-established on every mutation:
/// `sum(category values) == total_value_usd` and percentages sum to 100
/// within rounding tolerance.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Portfolio {
    pub user_id: Uuid,
    pub cash_usd: Decimal,
    pub stable_yield_usd: Decimal,
    pub equity_usd: Decimal,
    pub gold_usd: Decimal,
    pub crypto_usd: Decimal,
    pub total_value_usd: Decimal,
    pub cash_pct: Decimal,
    pub stable_yield_pct: Decimal,
    pub equity_pct: Decimal,
    pub gold_pct: Decimal,
    pub crypto_pct: Decimal,
    pub total_deposited_usd: Decimal,
    pub total_withdrawn_usd: Decimal,
    pub all_time_return_pct: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            cash_usd: Decimal::ZERO,
            stable_yield_usd: Decimal::ZERO,
            equity_usd: Decimal::ZERO,
            gold_usd: Decimal::ZERO,
            crypto_usd: Decimal::ZERO,
            total_value_usd: Decimal::ZERO,
            cash_pct: Decimal::ZERO,
            stable_yield_pct: Decimal::ZERO,
            equity_pct: Decimal::ZERO,
            gold_pct: Decimal::ZERO,
            crypto_pct: Decimal::ZERO,
            total_deposited_usd: Decimal::ZERO,
            total_withdrawn_usd: Decimal::ZERO,
            all_time_return_pct: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    pub fn category_value(&self, category: AssetCategory) -> Decimal {
        match category {
            AssetCategory::Cash => self.cash_usd,
            AssetCategory::StableYield => self.stable_yield_usd,
            AssetCategory::Equity => self.equity_usd,
            AssetCategory::Gold => self.gold_usd,
            AssetCategory::Crypto => self.crypto_usd,
        }
    }

    pub fn set_category_value(&mut self, category: AssetCategory, value: Decimal) {
        match category {
            AssetCategory::Cash => self.cash_usd = value,
            AssetCategory::StableYield => self.stable_yield_usd = value,
            AssetCategory::Equity => self.equity_usd = value,
            AssetCategory::Gold => self.gold_usd = value,
            AssetCategory::Crypto => self.crypto_usd = value,
        }
    }
}

/// Cached per-category balances, mutated together with the portfolio.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub user_id: Uuid,
    pub cash_balance: Decimal,
    pub stable_yield_balance: Decimal,
    pub equity_balance: Decimal,
    pub gold_balance: Decimal,
    pub crypto_balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Per-symbol balance/value row, created on first touch of a symbol.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PortfolioHolding {
    pub id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub category: AssetCategory,
    pub balance: Decimal,
    pub value_usd: Decimal,
    pub updated_at: DateTime<Utc>,
}
