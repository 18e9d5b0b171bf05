use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::models::*;
use crate::error::AppResult;

const PORTFOLIO_COLUMNS: &str = r#"
    user_id, cash_usd, stable_yield_usd, equity_usd, gold_usd, crypto_usd,
    total_value_usd, cash_pct, stable_yield_pct, equity_pct, gold_pct,
    crypto_pct, total_deposited_usd, total_withdrawn_usd,
    all_time_return_pct, updated_at
"#;

const WALLET_COLUMNS: &str = r#"
    user_id, cash_balance, stable_yield_balance, equity_balance,
    gold_balance, crypto_balance, updated_at
"#;

const HOLDING_COLUMNS: &str = r#"
    id, user_id, symbol, category, balance, value_usd, updated_at
"#;

/// Read access plus transaction-scoped write helpers. The write helpers
/// are called only by the balance reconciler; nothing else mutates these
/// tables.
pub struct PortfolioRepository {
    pub pool: PgPool,
}

impl PortfolioRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_portfolio(&self, user_id: Uuid) -> AppResult<Option<Portfolio>> {
        let portfolio = sqlx::query_as::<_, Portfolio>(&format!(
            "SELECT {PORTFOLIO_COLUMNS} FROM portfolios WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(portfolio)
    }

    pub async fn get_holdings(&self, user_id: Uuid) -> AppResult<Vec<PortfolioHolding>> {
        let holdings = sqlx::query_as::<_, PortfolioHolding>(&format!(
            "SELECT {HOLDING_COLUMNS} FROM portfolio_holdings WHERE user_id = $1 ORDER BY symbol"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(holdings)
    }

    pub async fn get_wallet(&self, user_id: Uuid) -> AppResult<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    // ========== RECONCILER-ONLY, TRANSACTION-SCOPED ==========

    /// Load the portfolio row under a row lock, creating an empty one on
    /// first touch of a user.
    pub async fn lock_portfolio(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> AppResult<Portfolio> {
        let existing = sqlx::query_as::<_, Portfolio>(&format!(
            "SELECT {PORTFOLIO_COLUMNS} FROM portfolios WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(portfolio) = existing {
            return Ok(portfolio);
        }

        let created = sqlx::query_as::<_, Portfolio>(&format!(
            r#"
            INSERT INTO portfolios (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = NOW()
            RETURNING {PORTFOLIO_COLUMNS}
            "#
        ))
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(created)
    }

    pub async fn save_portfolio(
        tx: &mut Transaction<'_, Postgres>,
        portfolio: &Portfolio,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE portfolios
            SET cash_usd = $2, stable_yield_usd = $3, equity_usd = $4,
                gold_usd = $5, crypto_usd = $6, total_value_usd = $7,
                cash_pct = $8, stable_yield_pct = $9, equity_pct = $10,
                gold_pct = $11, crypto_pct = $12, total_deposited_usd = $13,
                total_withdrawn_usd = $14, all_time_return_pct = $15,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(portfolio.user_id)
        .bind(portfolio.cash_usd)
        .bind(portfolio.stable_yield_usd)
        .bind(portfolio.equity_usd)
        .bind(portfolio.gold_usd)
        .bind(portfolio.crypto_usd)
        .bind(portfolio.total_value_usd)
        .bind(portfolio.cash_pct)
        .bind(portfolio.stable_yield_pct)
        .bind(portfolio.equity_pct)
        .bind(portfolio.gold_pct)
        .bind(portfolio.crypto_pct)
        .bind(portfolio.total_deposited_usd)
        .bind(portfolio.total_withdrawn_usd)
        .bind(portfolio.all_time_return_pct)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Apply a signed delta to one wallet category balance, creating the
    /// wallet row on first touch.
    pub async fn adjust_wallet_balance(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        category: AssetCategory,
        delta: Decimal,
    ) -> AppResult<()> {
        let column = match category {
            AssetCategory::Cash => "cash_balance",
            AssetCategory::StableYield => "stable_yield_balance",
            AssetCategory::Equity => "equity_balance",
            AssetCategory::Gold => "gold_balance",
            AssetCategory::Crypto => "crypto_balance",
        };

        sqlx::query(&format!(
            r#"
            INSERT INTO wallets (user_id, {column}) VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET {column} = wallets.{column} + EXCLUDED.{column},
                          updated_at = NOW()
            "#
        ))
        .bind(user_id)
        .bind(delta)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Upsert a per-symbol holding row with signed balance/value deltas.
    pub async fn adjust_holding(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        symbol: &str,
        category: AssetCategory,
        balance_delta: Decimal,
        value_delta: Decimal,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO portfolio_holdings (user_id, symbol, category, balance, value_usd)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, symbol)
            DO UPDATE SET balance = portfolio_holdings.balance + EXCLUDED.balance,
                          value_usd = portfolio_holdings.value_usd + EXCLUDED.value_usd,
                          updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(symbol)
        .bind(category)
        .bind(balance_delta)
        .bind(value_delta)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}
