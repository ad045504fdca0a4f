use chrono::{DateTime, Duration, Utc};

use crate::domain::repository::{IdempotencyRepository, JobRepository, WebhookCallRepository};
use crate::error::DeliveryServiceError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub webhook_calls: u64,
    pub idempotency_records: u64,
    pub jobs: u64,
}

/// Nightly deletion of rows past their retention window. Running it twice
/// deletes nothing the second time.
pub struct RetentionUseCase<C, I, J>
where
    C: WebhookCallRepository,
    I: IdempotencyRepository,
    J: JobRepository,
{
    pub calls: C,
    pub idempotency: I,
    pub jobs: J,
    pub call_retention: Duration,
    pub job_retention: Duration,
}

impl<C, I, J> RetentionUseCase<C, I, J>
where
    C: WebhookCallRepository,
    I: IdempotencyRepository,
    J: JobRepository,
{
    pub async fn execute(&self, now: DateTime<Utc>) -> Result<RetentionReport, DeliveryServiceError> {
        let report = RetentionReport {
            webhook_calls: self.calls.delete_created_before(now - self.call_retention).await?,
            idempotency_records: self.idempotency.delete_expired(now).await?,
            jobs: self.jobs.delete_completed_before(now - self.job_retention).await?,
        };
        tracing::info!(
            webhook_calls = report.webhook_calls,
            idempotency_records = report.idempotency_records,
            jobs = report.jobs,
            "retention sweep finished"
        );
        Ok(report)
    }
}
