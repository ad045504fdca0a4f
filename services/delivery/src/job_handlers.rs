use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;

use crate::domain::types::{InboundNotification, Job};
use crate::state::AppState;
use crate::usecase::inbound::ProcessInboundUseCase;
use crate::usecase::jobs::JobHandler;
use crate::usecase::retention::RetentionUseCase;
use crate::usecase::webhook_delivery::{DeliveryJobPayload, DeliveryOutcome};
use crate::usecase::webhook_recovery::WebhookRecoveryUseCase;

const PENDING_GRACE: Duration = Duration::from_secs(60);
const RECOVERY_BATCH_SIZE: u64 = 500;
const STALL_TIMEOUT_MULTIPLIER: u32 = 5;
const COMPLETED_JOB_RETENTION_DAYS: i64 = 7;

/// `webhook-delivery`: one attempt of one call.
#[derive(Clone)]
pub struct WebhookDeliveryJobs {
    pub state: AppState,
}

impl JobHandler for WebhookDeliveryJobs {
    fn handle(&self, job: Job) -> impl Future<Output = anyhow::Result<()>> + Send {
        let tracker = self.state.delivery_tracker();
        async move {
            let payload: DeliveryJobPayload =
                serde_json::from_value(job.payload).context("decode webhook delivery job")?;
            match tracker.deliver(payload.call_id).await? {
                DeliveryOutcome::NotDue { next_attempt_at } => {
                    anyhow::bail!("webhook call not due until {next_attempt_at}")
                }
                _ => Ok(()),
            }
        }
    }
}

/// `webhook-recovery`: resume calls whose jobs were lost.
#[derive(Clone)]
pub struct WebhookRecoveryJobs {
    pub state: AppState,
}

impl JobHandler for WebhookRecoveryJobs {
    fn handle(&self, _job: Job) -> impl Future<Output = anyhow::Result<()>> + Send {
        let uc = WebhookRecoveryUseCase {
            calls: self.state.webhook_call_repo(),
            jobs: self.state.job_queue(),
            stall_after: self.state.config.webhook_timeout * STALL_TIMEOUT_MULTIPLIER,
            pending_grace: PENDING_GRACE,
            batch_size: RECOVERY_BATCH_SIZE,
        };
        async move {
            uc.execute(Utc::now()).await?;
            Ok(())
        }
    }
}

/// `inbound-messages`: provider notification to webhook event.
#[derive(Clone)]
pub struct InboundMessageJobs {
    pub state: AppState,
}

impl JobHandler for InboundMessageJobs {
    fn handle(&self, job: Job) -> impl Future<Output = anyhow::Result<()>> + Send {
        let uc = ProcessInboundUseCase {
            emitter: self.state.webhook_emitter(),
        };
        async move {
            let notification: InboundNotification =
                serde_json::from_value(job.payload).context("decode inbound notification job")?;
            uc.execute(&notification).await?;
            Ok(())
        }
    }
}

/// `cleanup`: nightly retention sweep.
#[derive(Clone)]
pub struct CleanupJobs {
    pub state: AppState,
}

impl JobHandler for CleanupJobs {
    fn handle(&self, _job: Job) -> impl Future<Output = anyhow::Result<()>> + Send {
        let uc = RetentionUseCase {
            calls: self.state.webhook_call_repo(),
            idempotency: self.state.idempotency_repo(),
            jobs: self.state.job_repo(),
            call_retention: chrono::Duration::days(self.state.config.webhook_call_retention_days),
            job_retention: chrono::Duration::days(COMPLETED_JOB_RETENTION_DAYS),
        };
        async move {
            uc.execute(Utc::now()).await?;
            Ok(())
        }
    }
}
