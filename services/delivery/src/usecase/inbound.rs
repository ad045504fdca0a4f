use courier_domain::event::WebhookEventType;

use crate::domain::repository::{JobRepository, SubscriptionRepository, WebhookCallRepository};
use crate::domain::types::{Enqueued, INBOUND_MESSAGES_QUEUE, InboundNotification};
use crate::error::DeliveryServiceError;
use crate::usecase::jobs::{EnqueueOptions, JobQueue};
use crate::usecase::webhook_emit::{EmittedEvent, WebhookEmitter};

/// Webhook event for a provider notification type.
pub fn event_type_for(notification_type: &str) -> Option<WebhookEventType> {
    let event_type = match notification_type {
        "Send" => WebhookEventType::EmailSent,
        "Delivery" => WebhookEventType::EmailDelivered,
        "DeliveryDelay" => WebhookEventType::EmailDeliveryDelayed,
        "Bounce" => WebhookEventType::EmailBounced,
        "Complaint" => WebhookEventType::EmailComplained,
        "Reject" => WebhookEventType::EmailRejected,
        "Rendering Failure" | "RenderingFailure" => WebhookEventType::EmailRenderingFailure,
        "Open" => WebhookEventType::EmailOpened,
        "Click" => WebhookEventType::EmailClicked,
        "Subscription" => WebhookEventType::EmailSuppressed,
        _ => return None,
    };
    Some(event_type)
}

/// Event data: the provider's fields plus the ids that tie them to a send.
fn event_data(notification: &InboundNotification) -> serde_json::Value {
    let mut data = match &notification.data {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("detail".to_owned(), other.clone());
            map
        }
    };
    if let Some(email_id) = &notification.email_id {
        data.insert("emailId".to_owned(), email_id.clone().into());
    }
    data.insert(
        "providerMessageId".to_owned(),
        notification.message_id.clone().into(),
    );
    serde_json::Value::Object(data)
}

// ── EnqueueInbound (HTTP path) ───────────────────────────────────────────────

pub struct EnqueueInboundUseCase<J: JobRepository> {
    pub jobs: JobQueue<J>,
}

impl<J: JobRepository> EnqueueInboundUseCase<J> {
    /// Provider redeliveries of one notification collapse onto one job.
    pub async fn execute(
        &self,
        notification: &InboundNotification,
    ) -> Result<Enqueued, DeliveryServiceError> {
        if notification.message_id.trim().is_empty() {
            return Err(DeliveryServiceError::InvalidRequest(
                "messageId is required".to_owned(),
            ));
        }
        let payload = serde_json::to_value(notification)
            .map_err(|e| DeliveryServiceError::Internal(e.into()))?;
        self.jobs
            .enqueue(
                INBOUND_MESSAGES_QUEUE,
                &notification.job_key(),
                payload,
                EnqueueOptions::default(),
            )
            .await
    }
}

// ── ProcessInbound (job path) ────────────────────────────────────────────────

pub struct ProcessInboundUseCase<S, C, J>
where
    S: SubscriptionRepository,
    C: WebhookCallRepository,
    J: JobRepository,
{
    pub emitter: WebhookEmitter<S, C, J>,
}

impl<S, C, J> ProcessInboundUseCase<S, C, J>
where
    S: SubscriptionRepository,
    C: WebhookCallRepository,
    J: JobRepository,
{
    /// `None` for notification types with no webhook counterpart.
    pub async fn execute(
        &self,
        notification: &InboundNotification,
    ) -> Result<Option<EmittedEvent>, DeliveryServiceError> {
        let Some(event_type) = event_type_for(&notification.notification_type) else {
            tracing::warn!(
                message_id = %notification.message_id,
                notification_type = %notification.notification_type,
                "ignoring unmapped inbound notification"
            );
            return Ok(None);
        };
        let emitted = self
            .emitter
            .emit(
                notification.team_id,
                event_type,
                notification.domain_id.as_deref(),
                event_data(notification),
            )
            .await?;
        Ok(Some(emitted))
    }
}
