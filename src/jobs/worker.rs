use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

use super::models::{Job, JobKind};
use super::queue::JobQueue;
use crate::config::Config;
use crate::error::{AppError, AppResult};

/// What a handler wants done with the job after a successful run.
pub enum JobOutcome {
    /// Work is finished, mark the job succeeded.
    Completed,
    /// Not ready yet (e.g. waiting on confirmations); poll again later.
    RescheduleAfter(Duration),
    /// Needs an operator; park with the given reason and stop retrying.
    Park(String),
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Run one claimed job. An `Err` is treated as transient and retried
    /// with backoff until the attempt cap parks the job.
    async fn run(&self, job: &Job) -> AppResult<JobOutcome>;
}

/// Polls the queue and dispatches claimed jobs to registered handlers.
///
/// Each job kind gets its own claim loop, bounded by a semaphore sized by
/// the kind's weight class, so a burst of slow chain polls cannot starve
/// cheap completion jobs.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
    poll_interval: Duration,
    heavy_concurrency: usize,
    light_concurrency: usize,
    stall_seconds: i64,
    worker_id: String,
}

impl WorkerPool {
    pub fn new(queue: Arc<JobQueue>, config: &Config) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            poll_interval: Duration::from_millis(config.queue_poll_interval_ms),
            heavy_concurrency: config.heavy_job_concurrency,
            light_concurrency: config.light_job_concurrency,
            stall_seconds: config.job_stall_seconds,
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    /// Spawn one claim loop per registered kind plus the stall detector.
    /// Returns once every loop has observed the shutdown signal and
    /// drained its in-flight jobs.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut tasks = Vec::new();

        for (kind, handler) in &self.handlers {
            let concurrency = if kind.is_heavy() {
                self.heavy_concurrency
            } else {
                self.light_concurrency
            };

            tasks.push(tokio::spawn(claim_loop(
                *kind,
                handler.clone(),
                self.queue.clone(),
                concurrency,
                self.poll_interval,
                self.worker_id.clone(),
                shutdown.clone(),
            )));
        }

        tasks.push(tokio::spawn(stall_loop(
            self.queue.clone(),
            self.stall_seconds,
            shutdown.clone(),
        )));

        // Block here until shutdown is signalled, then wait for the loops.
        let _ = shutdown.changed().await;
        info!("Worker pool shutting down, draining in-flight jobs");
        for task in tasks {
            if let Err(e) = task.await {
                error!("Worker task panicked during drain: {}", e);
            }
        }
        info!("Worker pool drained");
    }
}

async fn claim_loop(
    kind: JobKind,
    handler: Arc<dyn JobHandler>,
    queue: Arc<JobQueue>,
    concurrency: usize,
    poll_interval: Duration,
    worker_id: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    info!(?kind, concurrency, "Claim loop started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }

        let available = semaphore.available_permits();
        if available == 0 {
            continue;
        }

        let jobs = match queue.claim_batch(kind, available as i64, &worker_id).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(?kind, "Failed to claim jobs: {}", e);
                continue;
            }
        };

        for job in jobs {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let handler = handler.clone();
            let queue = queue.clone();

            tokio::spawn(async move {
                let _permit = permit;
                execute_job(&*handler, &queue, job).await;
            });
        }
    }

    // Drain: wait for every permit to come back before reporting done.
    let _ = semaphore.acquire_many(concurrency as u32).await;
    info!(?kind, "Claim loop stopped");
}

async fn execute_job(handler: &dyn JobHandler, queue: &JobQueue, job: Job) {
    if job.past_deadline() {
        warn!(job_key = %job.job_key, "Job past its deadline, parking");
        if let Err(e) = queue.park(job.id, "deadline exceeded").await {
            error!(job_key = %job.job_key, "Failed to park expired job: {}", e);
        }
        return;
    }

    let result = handler.run(&job).await;
    let follow_up = match result {
        Ok(JobOutcome::Completed) => queue.complete(job.id).await,
        Ok(JobOutcome::RescheduleAfter(delay)) => queue.reschedule(job.id, delay).await,
        Ok(JobOutcome::Park(reason)) => queue.park(job.id, &reason).await,
        Err(e) => {
            warn!(job_key = %job.job_key, attempt = job.attempts, "Job failed: {}", e);
            match failure_action(&e) {
                FailureAction::Retry => queue.retry_or_park(&job, &e.to_string()).await,
                // Validation and business-terminal errors cannot succeed
                // on a replay; park straight away for inspection.
                FailureAction::Park => queue.park(job.id, &e.to_string()).await,
            }
        }
    };

    if let Err(e) = follow_up {
        // The stall detector will recover the lock; nothing else to do.
        error!(job_key = %job.job_key, "Failed to update job state: {}", e);
    }
}

/// What the queue does with a handler error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureAction {
    /// Transient: backoff and retry up to the attempt cap.
    Retry,
    /// Non-transient: a replay would fail identically, park immediately.
    Park,
}

fn failure_action(error: &AppError) -> FailureAction {
    if error.is_transient() {
        FailureAction::Retry
    } else {
        FailureAction::Park
    }
}

async fn stall_loop(queue: Arc<JobQueue>, stall_seconds: i64, mut shutdown: watch::Receiver<bool>) {
    let interval = Duration::from_secs((stall_seconds as u64 / 2).max(10));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        match queue.requeue_stalled(stall_seconds).await {
            Ok(0) => {}
            Ok(n) => warn!(count = n, "Re-queued stalled jobs"),
            Err(e) => error!("Stall sweep failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DepositError, SwapError};

    #[test]
    fn transient_errors_are_retried() {
        assert_eq!(
            failure_action(&AppError::External("provider 503".into())),
            FailureAction::Retry
        );
        assert_eq!(
            failure_action(&DepositError::ChainLookupFailed("rpc timeout".into()).into()),
            FailureAction::Retry
        );
        assert_eq!(
            failure_action(&SwapError::ProviderUnavailable("502".into()).into()),
            FailureAction::Retry
        );
    }

    #[test]
    fn validation_and_business_failures_park_without_retry() {
        assert_eq!(
            failure_action(&AppError::UnsupportedAsset("DOGE".into())),
            FailureAction::Park
        );
        assert_eq!(
            failure_action(&AppError::InvalidInput("bad amount".into())),
            FailureAction::Park
        );
        assert_eq!(
            failure_action(&SwapError::OrderFailed("venue rejected".into()).into()),
            FailureAction::Park
        );
    }
}
