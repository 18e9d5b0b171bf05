use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::portfolio::{AssetCategory, Portfolio};

/// The net effect of one settled transfer on a user's buckets.
#[derive(Debug, Clone)]
pub struct TransferDelta {
    pub from_category: AssetCategory,
    pub to_category: AssetCategory,
    pub from_usd: Decimal,
    pub to_usd: Decimal,
    /// External inflow (deposit): counts toward cumulative deposits.
    pub is_inflow: bool,
}

/// Apply one transfer's category deltas. The source category is
/// decremented unless it is the cash/base asset; the destination is
/// always incremented. Totals and percentages are NOT recomputed here -
/// call `recompute` once after all deltas in a batch.
pub fn apply_delta(portfolio: &mut Portfolio, delta: &TransferDelta) {
    if delta.from_category != AssetCategory::Cash {
        let current = portfolio.category_value(delta.from_category);
        portfolio.set_category_value(delta.from_category, current - delta.from_usd);
    }

    let current = portfolio.category_value(delta.to_category);
    portfolio.set_category_value(delta.to_category, current + delta.to_usd);

    if delta.is_inflow {
        portfolio.total_deposited_usd += delta.to_usd;
    }
}

/// Recompute total value, per-category percentages and the all-time
/// return from the category values. Runs on every mutation so the
/// `sum(values) == total` and `sum(pct) == 100` invariants hold at commit.
pub fn recompute(portfolio: &mut Portfolio) {
    let hundred = dec!(100);

    let total: Decimal = AssetCategory::all()
        .iter()
        .map(|c| portfolio.category_value(*c))
        .sum();
    portfolio.total_value_usd = total;

    let pct = |value: Decimal| -> Decimal {
        if total.is_zero() {
            Decimal::ZERO
        } else {
            value / total * hundred
        }
    };
    portfolio.cash_pct = pct(portfolio.cash_usd);
    portfolio.stable_yield_pct = pct(portfolio.stable_yield_usd);
    portfolio.equity_pct = pct(portfolio.equity_usd);
    portfolio.gold_pct = pct(portfolio.gold_usd);
    portfolio.crypto_pct = pct(portfolio.crypto_usd);

    let net_deposited = portfolio.total_deposited_usd - portfolio.total_withdrawn_usd;
    portfolio.all_time_return_pct = if net_deposited > Decimal::ZERO {
        (total - net_deposited) / net_deposited * hundred
    } else {
        Decimal::ZERO
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn pct_sum(p: &Portfolio) -> Decimal {
        p.cash_pct + p.stable_yield_pct + p.equity_pct + p.gold_pct + p.crypto_pct
    }

    fn value_sum(p: &Portfolio) -> Decimal {
        AssetCategory::all()
            .iter()
            .map(|c| p.category_value(*c))
            .sum()
    }

    #[test]
    fn deposit_inflow_increments_destination_only() {
        let mut p = Portfolio::empty(Uuid::new_v4());
        apply_delta(
            &mut p,
            &TransferDelta {
                from_category: AssetCategory::Cash,
                to_category: AssetCategory::StableYield,
                from_usd: dec!(100),
                to_usd: dec!(100),
                is_inflow: true,
            },
        );
        recompute(&mut p);

        assert_eq!(p.stable_yield_usd, dec!(100));
        assert_eq!(p.cash_usd, Decimal::ZERO);
        assert_eq!(p.total_value_usd, dec!(100));
        assert_eq!(p.total_deposited_usd, dec!(100));
        assert_eq!(p.stable_yield_pct, dec!(100));
        assert_eq!(p.all_time_return_pct, Decimal::ZERO);
    }

    #[test]
    fn swap_moves_value_between_categories() {
        let mut p = Portfolio::empty(Uuid::new_v4());
        p.stable_yield_usd = dec!(300);
        p.total_deposited_usd = dec!(300);

        apply_delta(
            &mut p,
            &TransferDelta {
                from_category: AssetCategory::StableYield,
                to_category: AssetCategory::Gold,
                from_usd: dec!(120),
                to_usd: dec!(119.5),
                is_inflow: false,
            },
        );
        recompute(&mut p);

        assert_eq!(p.stable_yield_usd, dec!(180));
        assert_eq!(p.gold_usd, dec!(119.5));
        assert_eq!(p.total_value_usd, value_sum(&p));
    }

    #[test]
    fn invariants_hold_after_mixed_batch() {
        let mut p = Portfolio::empty(Uuid::new_v4());
        let deltas = [
            TransferDelta {
                from_category: AssetCategory::Cash,
                to_category: AssetCategory::Equity,
                from_usd: dec!(250),
                to_usd: dec!(250),
                is_inflow: true,
            },
            TransferDelta {
                from_category: AssetCategory::Cash,
                to_category: AssetCategory::Crypto,
                from_usd: dec!(410.77),
                to_usd: dec!(410.77),
                is_inflow: true,
            },
            TransferDelta {
                from_category: AssetCategory::Equity,
                to_category: AssetCategory::Gold,
                from_usd: dec!(99.99),
                to_usd: dec!(99.21),
                is_inflow: false,
            },
        ];
        for d in &deltas {
            apply_delta(&mut p, d);
        }
        recompute(&mut p);

        // sum(category values) == total (exact under fixed-point)
        assert_eq!(value_sum(&p), p.total_value_usd);

        // sum(category percent) within [99.99, 100.01]
        let pct = pct_sum(&p);
        assert!(pct >= dec!(99.99) && pct <= dec!(100.01), "pct sum {}", pct);
    }

    #[test]
    fn all_time_return_tracks_net_deposits() {
        let mut p = Portfolio::empty(Uuid::new_v4());
        p.total_deposited_usd = dec!(1000);
        p.equity_usd = dec!(1100);
        recompute(&mut p);
        assert_eq!(p.all_time_return_pct, dec!(10));

        // No deposits yet: return pinned to zero instead of dividing by zero
        let mut q = Portfolio::empty(Uuid::new_v4());
        q.equity_usd = dec!(5);
        recompute(&mut q);
        assert_eq!(q.all_time_return_pct, Decimal::ZERO);
    }

    #[test]
    fn empty_portfolio_recompute_is_all_zero() {
        let mut p = Portfolio::empty(Uuid::new_v4());
        recompute(&mut p);
        assert_eq!(p.total_value_usd, Decimal::ZERO);
        assert_eq!(pct_sum(&p), Decimal::ZERO);
    }
}
