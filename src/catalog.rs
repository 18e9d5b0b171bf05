use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{AppError, AppResult};
use crate::portfolio::AssetCategory;

/// Maps asset symbols onto portfolio buckets. Seeded with the platform's
/// supported assets; overrides can be registered at runtime when the
/// catalog service (out of scope here) pushes updates.
pub struct AssetCatalog {
    categories: RwLock<HashMap<String, AssetCategory>>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        let mut categories = HashMap::new();
        for (symbol, category) in [
            ("USD", AssetCategory::Cash),
            ("NGN", AssetCategory::Cash),
            ("KES", AssetCategory::Cash),
            ("USDC", AssetCategory::Cash),
            ("USDT", AssetCategory::Cash),
            ("USDY", AssetCategory::StableYield),
            ("TBILL", AssetCategory::StableYield),
            ("SPYx", AssetCategory::Equity),
            ("QQQx", AssetCategory::Equity),
            ("PAXG", AssetCategory::Gold),
            ("XAUT", AssetCategory::Gold),
            ("BTC", AssetCategory::Crypto),
            ("ETH", AssetCategory::Crypto),
            ("SOL", AssetCategory::Crypto),
        ] {
            // Keys are stored uppercased, same as register() and lookups
            categories.insert(symbol.to_uppercase(), category);
        }

        Self {
            categories: RwLock::new(categories),
        }
    }

    /// Unknown symbols are a synchronous validation failure, never retried.
    pub fn get_asset_category(&self, symbol: &str) -> AppResult<AssetCategory> {
        self.categories
            .read()
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| AppError::UnsupportedAsset(symbol.to_string()))
    }

    pub fn register(&self, symbol: &str, category: AssetCategory) {
        self.categories
            .write()
            .insert(symbol.to_uppercase(), category);
    }

    pub fn is_supported(&self, symbol: &str) -> bool {
        self.categories.read().contains_key(&symbol.to_uppercase())
    }
}

impl Default for AssetCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let catalog = AssetCatalog::new();
        assert_eq!(
            catalog.get_asset_category("paxg").unwrap(),
            AssetCategory::Gold
        );
        assert_eq!(
            catalog.get_asset_category("USDC").unwrap(),
            AssetCategory::Cash
        );
    }

    #[test]
    fn mixed_case_seed_symbols_resolve() {
        let catalog = AssetCatalog::new();
        // Equity tickers are seeded in mixed case; every casing must hit
        for symbol in ["SPYx", "SPYX", "spyx", "QQQx"] {
            assert_eq!(
                catalog.get_asset_category(symbol).unwrap(),
                AssetCategory::Equity,
                "symbol {} did not resolve",
                symbol
            );
        }
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let catalog = AssetCatalog::new();
        assert!(matches!(
            catalog.get_asset_category("DOGE"),
            Err(AppError::UnsupportedAsset(_))
        ));
    }

    #[test]
    fn runtime_registration_overrides() {
        let catalog = AssetCatalog::new();
        catalog.register("DOGE", AssetCategory::Crypto);
        assert_eq!(
            catalog.get_asset_category("doge").unwrap(),
            AssetCategory::Crypto
        );
    }
}
