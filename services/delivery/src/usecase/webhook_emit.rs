use chrono::Utc;

use courier_domain::event::WebhookEventType;
use courier_domain::id::{EventId, TeamId, WebhookCallId};

use crate::domain::repository::{JobRepository, SubscriptionRepository, WebhookCallRepository};
use crate::domain::types::{WEBHOOK_DELIVERY_QUEUE, WebhookCall};
use crate::error::DeliveryServiceError;
use crate::usecase::jobs::{EnqueueOptions, JobQueue};
use crate::usecase::webhook_delivery::{DeliveryJobPayload, delivery_job_key};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedEvent {
    pub event_id: EventId,
    pub call_ids: Vec<WebhookCallId>,
}

/// Fans one event out to every matching subscription of a team.
pub struct WebhookEmitter<S, C, J>
where
    S: SubscriptionRepository,
    C: WebhookCallRepository,
    J: JobRepository,
{
    pub subscriptions: S,
    pub calls: C,
    pub jobs: JobQueue<J>,
    pub max_attempts: u32,
}

impl<S, C, J> WebhookEmitter<S, C, J>
where
    S: SubscriptionRepository,
    C: WebhookCallRepository,
    J: JobRepository,
{
    /// Create one `PENDING` call per matching subscription and queue its
    /// first attempt. A failed enqueue leaves the call for the recovery sweep.
    pub async fn emit(
        &self,
        team_id: TeamId,
        event_type: WebhookEventType,
        domain_id: Option<&str>,
        data: serde_json::Value,
    ) -> Result<EmittedEvent, DeliveryServiceError> {
        let event_id = EventId::new();
        let now = Utc::now();

        let calls: Vec<WebhookCall> = self
            .subscriptions
            .list_enabled_by_team(team_id)
            .await?
            .iter()
            .filter(|s| s.matches(event_type, domain_id))
            .map(|s| WebhookCall::new_pending(s, event_id, event_type, data.clone(), self.max_attempts, now))
            .collect();

        if calls.is_empty() {
            tracing::debug!(team_id = %team_id, event_type = %event_type, "no webhook subscribers");
            return Ok(EmittedEvent {
                event_id,
                call_ids: Vec::new(),
            });
        }

        self.calls.create_many(&calls).await?;

        for call in &calls {
            let payload = DeliveryJobPayload { call_id: call.id }.to_value();
            if let Err(e) = self
                .jobs
                .enqueue(
                    WEBHOOK_DELIVERY_QUEUE,
                    &delivery_job_key(call.id, 1),
                    payload,
                    EnqueueOptions::default(),
                )
                .await
            {
                tracing::warn!(
                    error = ?e,
                    call_id = %call.id,
                    "failed to enqueue webhook delivery, leaving it to recovery"
                );
            }
        }

        tracing::info!(
            team_id = %team_id,
            event_id = %event_id,
            event_type = %event_type,
            calls = calls.len(),
            "webhook event emitted"
        );
        Ok(EmittedEvent {
            event_id,
            call_ids: calls.iter().map(|c| c.id).collect(),
        })
    }
}
