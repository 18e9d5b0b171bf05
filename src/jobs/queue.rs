use chrono::Utc;
use rand::Rng;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::models::*;
use crate::alerts::{AlertKind, OpsAlertStore};
use crate::error::AppResult;

/// Maximum backoff between retries, seconds
const MAX_BACKOFF_SECS: u64 = 300;

const JOB_COLUMNS: &str = r#"
    id, job_key, kind, payload, status, attempts, max_attempts, run_at,
    deadline_at, locked_at, locked_by, last_error, created_at, updated_at
"#;

/// Durable Postgres-backed task queue.
///
/// Claiming uses `FOR UPDATE SKIP LOCKED`, so any number of worker
/// processes can pull from the same table without double-claiming. The
/// unique `job_key` deduplicates re-submission at the queue, not in
/// application code.
pub struct JobQueue {
    pool: PgPool,
    alerts: OpsAlertStore,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        let alerts = OpsAlertStore::new(pool.clone());
        Self { pool, alerts }
    }

    /// Insert-or-ignore by job key. Returns false when an identical job
    /// already exists, which callers treat as success.
    pub async fn enqueue(&self, new_job: NewJob) -> AppResult<bool> {
        let run_at = match new_job.delay {
            Some(delay) => Utc::now() + delay,
            None => Utc::now(),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (job_key, kind, payload, max_attempts, run_at, deadline_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (job_key) DO NOTHING
            "#,
        )
        .bind(&new_job.job_key)
        .bind(new_job.kind)
        .bind(&new_job.payload)
        .bind(new_job.max_attempts)
        .bind(run_at)
        .bind(new_job.deadline_at)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            info!(job_key = %new_job.job_key, kind = ?new_job.kind, "Job enqueued");
        }
        Ok(inserted)
    }

    /// Claim up to `limit` due jobs of one kind. The claim increments the
    /// attempt counter and stamps the lock, all in one statement.
    pub async fn claim_batch(
        &self,
        kind: JobKind,
        limit: i64,
        worker_id: &str,
    ) -> AppResult<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = 'running', attempts = attempts + 1,
                locked_at = NOW(), locked_by = $1, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'queued' AND kind = $2 AND run_at <= NOW()
                ORDER BY run_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(worker_id)
        .bind(kind)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    pub async fn complete(&self, job_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded', locked_at = NULL, locked_by = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Put a repeating poll back on the schedule. Claiming increments the
    /// attempt counter, so repeating jobs need a generous attempt cap; the
    /// deadline is the real bound on their lifetime.
    pub async fn reschedule(&self, job_id: Uuid, delay: Duration) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', run_at = NOW() + make_interval(secs => $2),
                locked_at = NULL, locked_by = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Transient failure: requeue with exponential backoff, or park the
    /// job once the attempt cap is reached. Parked jobs are never dropped;
    /// they wait for an operator.
    pub async fn retry_or_park(&self, job: &Job, error: &str) -> AppResult<()> {
        if job.attempts >= job.max_attempts {
            warn!(
                job_key = %job.job_key,
                attempts = job.attempts,
                error,
                "Retry attempts exhausted, parking job"
            );
            self.park(job.id, error).await?;
            self.alerts
                .record(
                    AlertKind::RetryExhausted,
                    Some(job.id),
                    serde_json::json!({
                        "job_key": job.job_key,
                        "kind": job.kind,
                        "attempts": job.attempts,
                        "last_error": error,
                    }),
                )
                .await?;
            return Ok(());
        }

        let delay = backoff_delay(job.attempts);
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', run_at = NOW() + make_interval(secs => $2),
                last_error = $3, locked_at = NULL, locked_by = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(delay.as_secs_f64())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Park a job in the failed state for manual inspection.
    pub async fn park(&self, job_id: Uuid, reason: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = $2,
                locked_at = NULL, locked_by = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Re-queue jobs whose worker died mid-execution. Observable on
    /// purpose: a stalled job means a crashed process, not a business
    /// failure, and each one raises an ops alert.
    pub async fn requeue_stalled(&self, stall_seconds: i64) -> AppResult<u64> {
        let stalled = sqlx::query_as::<_, Job>(&format!(
            r#"
            UPDATE jobs
            SET status = 'queued', locked_at = NULL, locked_by = NULL, updated_at = NOW()
            WHERE status = 'running'
              AND locked_at < NOW() - make_interval(secs => $1)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(stall_seconds as f64)
        .fetch_all(&self.pool)
        .await?;

        for job in &stalled {
            warn!(
                job_key = %job.job_key,
                locked_by = job.locked_by.as_deref().unwrap_or("unknown"),
                "Stalled job re-queued"
            );
            self.alerts
                .record(
                    AlertKind::JobStalled,
                    Some(job.id),
                    serde_json::json!({
                        "job_key": job.job_key,
                        "kind": job.kind,
                        "locked_by": job.locked_by,
                    }),
                )
                .await?;
        }

        Ok(stalled.len() as u64)
    }
}

/// Exponential backoff with a cap, plus jitter so retries from many jobs
/// do not synchronize.
pub fn backoff_delay(attempt: i32) -> Duration {
    let base = backoff_secs(attempt);
    let jitter = rand::rng().random_range(0..=base / 4 + 1);
    Duration::from_secs(base + jitter)
}

fn backoff_secs(attempt: i32) -> u64 {
    let exp = attempt.clamp(0, 8) as u32;
    (2_u64.pow(exp)).min(MAX_BACKOFF_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_curve_doubles_then_caps() {
        assert_eq!(backoff_secs(0), 1);
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(2), 4);
        assert_eq!(backoff_secs(5), 32);
        assert_eq!(backoff_secs(8), 256);
        // Capped past 2^8
        assert_eq!(backoff_secs(9), 256);
        assert_eq!(backoff_secs(100), 256);
    }

    #[test]
    fn backoff_delay_stays_within_jitter_band() {
        for attempt in 0..12 {
            let base = backoff_secs(attempt);
            let delay = backoff_delay(attempt).as_secs();
            assert!(delay >= base);
            assert!(delay <= base + base / 4 + 1);
        }
    }
}
