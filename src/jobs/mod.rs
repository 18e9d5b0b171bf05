pub mod models;
pub mod queue;
pub mod worker;

pub use models::{
    DepositCompletionPayload, Job, JobKind, JobStatus, NewJob, OnchainConfirmationPayload,
    SwapConfirmationPayload, SwapExecutionPayload,
};
pub use queue::JobQueue;
pub use worker::{JobHandler, JobOutcome, WorkerPool};
