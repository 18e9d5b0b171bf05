pub mod deposit_completion;
pub mod deposit_confirmation;
pub mod swap_confirmation;
pub mod swap_execution;

pub use deposit_completion::DepositCompletionHandler;
pub use deposit_confirmation::DepositConfirmationHandler;
pub use swap_confirmation::SwapConfirmationHandler;
pub use swap_execution::SwapExecutionHandler;
