use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::repository::{JobRepository, WebhookCallRepository};
use crate::domain::types::{WEBHOOK_DELIVERY_QUEUE, WebhookCall};
use crate::error::DeliveryServiceError;
use crate::usecase::jobs::{EnqueueOptions, JobQueue};
use crate::usecase::webhook_delivery::{DeliveryJobPayload, delivery_job_key};

pub const ATTEMPT_INTERRUPTED: &str = "attempt interrupted";

/// Job key for the recovery sweep's copy of an attempt. Distinct from the
/// regular key so a lost or failed regular job does not block recovery.
pub fn recovery_job_key(call: &WebhookCall) -> String {
    format!("{}:recovery", delivery_job_key(call.id, call.attempt + 1))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub stalled: u64,
    pub failed_requeued: usize,
    pub pending_requeued: usize,
}

/// Periodic sweep that resumes calls whose delivery job was lost.
pub struct WebhookRecoveryUseCase<C, J>
where
    C: WebhookCallRepository,
    J: JobRepository,
{
    pub calls: C,
    pub jobs: JobQueue<J>,
    /// `IN_PROGRESS` longer than this counts as a crashed attempt.
    pub stall_after: Duration,
    /// `PENDING` longer than this counts as a lost first job.
    pub pending_grace: Duration,
    pub batch_size: u64,
}

impl<C, J> WebhookRecoveryUseCase<C, J>
where
    C: WebhookCallRepository,
    J: JobRepository,
{
    pub async fn execute(&self, now: DateTime<Utc>) -> Result<RecoveryReport, DeliveryServiceError> {
        let stalled = self
            .calls
            .fail_stalled(now - to_chrono(self.stall_after), ATTEMPT_INTERRUPTED, now)
            .await?;

        let due = self.calls.list_due_failed(now, self.batch_size).await?;
        let failed_requeued = self.requeue(&due).await?;

        let stale = self
            .calls
            .list_stale_pending(now - to_chrono(self.pending_grace), self.batch_size)
            .await?;
        let pending_requeued = self.requeue(&stale).await?;

        let report = RecoveryReport {
            stalled,
            failed_requeued,
            pending_requeued,
        };
        if report != RecoveryReport::default() {
            tracing::info!(
                stalled,
                failed_requeued,
                pending_requeued,
                "webhook recovery sweep"
            );
        }
        Ok(report)
    }

    async fn requeue(&self, calls: &[WebhookCall]) -> Result<usize, DeliveryServiceError> {
        let mut created = 0;
        for call in calls {
            let enqueued = self
                .jobs
                .enqueue(
                    WEBHOOK_DELIVERY_QUEUE,
                    &recovery_job_key(call),
                    DeliveryJobPayload { call_id: call.id }.to_value(),
                    EnqueueOptions::default(),
                )
                .await?;
            if !enqueued.is_duplicate() {
                created += 1;
            }
        }
        Ok(created)
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}
