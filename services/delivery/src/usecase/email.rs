use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_domain::event::WebhookEventType;
use courier_domain::id::TeamId;

use crate::domain::canonical::CanonicalValue;
use crate::domain::repository::{
    IdempotencyRepository, JobRepository, LockStore, MailProvider, SubscriptionRepository,
    WebhookCallRepository,
};
use crate::domain::types::OutboundEmail;
use crate::error::DeliveryServiceError;
use crate::usecase::idempotency::IdempotencyService;
use crate::usecase::rate_limit::RateLimiter;
use crate::usecase::webhook_emit::WebhookEmitter;

/// Stored as the idempotent result, so replays return the same ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentEmail {
    pub id: String,
    pub provider_message_id: String,
}

/// Identity of a send request for idempotency.
pub fn canonical_email(email: &OutboundEmail) -> CanonicalValue {
    let list = |items: &[String]| CanonicalValue::from(items.to_vec());
    CanonicalValue::map([
        ("from", Some(CanonicalValue::from(email.from.as_str()))),
        ("to", Some(list(&email.to))),
        ("subject", Some(CanonicalValue::from(email.subject.as_str()))),
        ("html", email.html.as_deref().map(CanonicalValue::from)),
        ("text", email.text.as_deref().map(CanonicalValue::from)),
        (
            "replyTo",
            Some(&email.reply_to).filter(|r| !r.is_empty()).map(|r| list(r)),
        ),
        ("domainId", email.domain_id.as_deref().map(CanonicalValue::from)),
    ])
}

fn validate(email: &OutboundEmail) -> Result<(), DeliveryServiceError> {
    if email.from.trim().is_empty() {
        return Err(DeliveryServiceError::InvalidRequest("from is required".to_owned()));
    }
    if email.to.is_empty() || email.to.iter().any(|to| to.trim().is_empty()) {
        return Err(DeliveryServiceError::InvalidRequest(
            "to must list at least one address".to_owned(),
        ));
    }
    if email.subject.trim().is_empty() {
        return Err(DeliveryServiceError::InvalidRequest("subject is required".to_owned()));
    }
    if email.html.is_none() && email.text.is_none() {
        return Err(DeliveryServiceError::InvalidRequest(
            "html or text is required".to_owned(),
        ));
    }
    Ok(())
}

pub struct SendEmailUseCase<L, R, P, S, C, J>
where
    L: LockStore,
    R: IdempotencyRepository,
    P: MailProvider,
    S: SubscriptionRepository,
    C: WebhookCallRepository,
    J: JobRepository,
{
    pub rate_limiter: RateLimiter<L>,
    pub idempotency: IdempotencyService<L, R>,
    pub provider: P,
    pub emitter: WebhookEmitter<S, C, J>,
}

impl<L, R, P, S, C, J> SendEmailUseCase<L, R, P, S, C, J>
where
    L: LockStore,
    R: IdempotencyRepository,
    P: MailProvider,
    S: SubscriptionRepository,
    C: WebhookCallRepository,
    J: JobRepository,
{
    pub async fn execute(
        &self,
        team_id: TeamId,
        idempotency_key: Option<&str>,
        email: OutboundEmail,
    ) -> Result<SentEmail, DeliveryServiceError> {
        validate(&email)?;
        self.rate_limiter.check(team_id).await?;

        let payload = canonical_email(&email);
        self.idempotency
            .execute(team_id, idempotency_key, &payload, || self.send(team_id, &email))
            .await
    }

    async fn send(
        &self,
        team_id: TeamId,
        email: &OutboundEmail,
    ) -> Result<SentEmail, DeliveryServiceError> {
        let provider_message_id = self.provider.send(email).await?;
        let sent = SentEmail {
            id: Uuid::new_v4().to_string(),
            provider_message_id,
        };
        tracing::info!(
            team_id = %team_id,
            email_id = %sent.id,
            provider_message_id = %sent.provider_message_id,
            "email handed to provider"
        );

        let data = serde_json::json!({
            "emailId": sent.id,
            "providerMessageId": sent.provider_message_id,
            "from": email.from,
            "to": email.to,
            "subject": email.subject,
        });
        // The message is already with the provider; a missing event must not
        // turn the send into a failure that a client would retry.
        if let Err(e) = self
            .emitter
            .emit(team_id, WebhookEventType::EmailSent, email.domain_id.as_deref(), data)
            .await
        {
            tracing::error!(error = ?e, email_id = %sent.id, "failed to emit email.sent");
        }
        Ok(sent)
    }
}
