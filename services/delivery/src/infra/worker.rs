use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::domain::repository::JobRepository;
use crate::error::DeliveryServiceError;
use crate::usecase::jobs::{JobHandler, JobQueue, JobRetryPolicy};

/// Polls one queue and runs its jobs one at a time. Run several per queue
/// for concurrency; claims never hand the same job to two workers.
pub struct JobWorker<R, H>
where
    R: JobRepository,
    H: JobHandler,
{
    pub repo: R,
    pub handler: Arc<H>,
    pub queue: String,
    pub poll_interval: Duration,
    /// How long a claimed job stays invisible to other workers.
    pub lease: Duration,
    pub retry: JobRetryPolicy,
}

impl<R, H> JobWorker<R, H>
where
    R: JobRepository,
    H: JobHandler,
{
    /// Claim and run at most one job. `true` when a job was processed.
    pub async fn run_once(&self) -> Result<bool, DeliveryServiceError> {
        let now = Utc::now();
        let released = self.repo.release_expired(&self.queue, now).await?;
        if released > 0 {
            tracing::warn!(queue = %self.queue, released, "released jobs with expired leases");
        }

        let Some(job) = self.repo.claim_next(&self.queue, now, self.lease).await? else {
            return Ok(false);
        };

        let handler = Arc::clone(&self.handler);
        let task_job = job.clone();
        let outcome = tokio::spawn(async move { handler.handle(task_job).await }).await;

        let error = match outcome {
            Ok(Ok(())) => {
                self.repo.complete(job.id, Utc::now()).await?;
                tracing::debug!(
                    job_id = %job.id,
                    queue = %job.queue,
                    job_key = %job.job_key,
                    attempts = job.attempts,
                    "job completed"
                );
                return Ok(true);
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(e) if e.is_panic() => "job handler panicked".to_owned(),
            Err(e) => format!("job handler aborted: {e}"),
        };

        if job.attempts >= job.max_attempts {
            self.repo.fail(job.id, Utc::now(), &error).await?;
            tracing::error!(
                job_id = %job.id,
                queue = %job.queue,
                job_key = %job.job_key,
                attempts = job.attempts,
                error = %error,
                "job failed permanently"
            );
        } else {
            let delay = chrono::Duration::from_std(self.retry.delay(job.attempts))
                .unwrap_or(chrono::Duration::minutes(10));
            let run_at = Utc::now() + delay;
            self.repo.retry_at(job.id, run_at, &error).await?;
            tracing::warn!(
                job_id = %job.id,
                queue = %job.queue,
                job_key = %job.job_key,
                attempts = job.attempts,
                error = %error,
                %run_at,
                "job failed, will retry"
            );
        }
        Ok(true)
    }

    /// Poll until `shutdown` flips to `true`. A job already running finishes first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(queue = %self.queue, "job worker started");
        while !*shutdown.borrow() {
            let idle = match self.run_once().await {
                Ok(processed) => !processed,
                Err(e) => {
                    tracing::error!(error = ?e, queue = %self.queue, "job worker poll failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        tracing::info!(queue = %self.queue, "job worker stopped");
    }
}

/// Materialise due recurring jobs every `interval` until shutdown.
pub async fn run_scheduler<R: JobRepository>(
    queue: JobQueue<R>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        match queue.fire_due_schedules(Utc::now()).await {
            Ok(0) => {}
            Ok(fired) => tracing::debug!(fired, "recurring jobs fired"),
            Err(e) => tracing::error!(error = ?e, "firing recurring jobs failed"),
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
    }
}
