pub mod gas_paid;
pub mod gasless;
pub mod traits;

use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, AppResult};
pub use gas_paid::GasPaidSwapProvider;
pub use gasless::GaslessIntentProvider;
pub use traits::*;

/// Construction-time backend selection. Business logic only ever sees the
/// `SwapProvider` trait object.
pub fn build_swap_provider(config: &Config) -> AppResult<Arc<dyn SwapProvider>> {
    match config.swap_provider.as_str() {
        "gas_paid" => Ok(Arc::new(GasPaidSwapProvider::new(
            config.swap_provider_url.clone(),
            config.swap_provider_api_key.clone(),
        ))),
        "gasless" => Ok(Arc::new(GaslessIntentProvider::new(
            config.swap_provider_url.clone(),
            config.swap_provider_api_key.clone(),
        ))),
        other => Err(AppError::Config(format!(
            "unknown swap provider: {}",
            other
        ))),
    }
}
