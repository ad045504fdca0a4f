use courier_domain::id::{SubscriptionId, TeamId, WebhookCallId};
use courier_domain::pagination::PageRequest;

use crate::domain::repository::{SubscriptionRepository, WebhookCallRepository};
use crate::domain::types::WebhookCall;
use crate::error::DeliveryServiceError;

// ── ListWebhookCalls ─────────────────────────────────────────────────────────

pub struct ListWebhookCallsUseCase<S, C>
where
    S: SubscriptionRepository,
    C: WebhookCallRepository,
{
    pub subscriptions: S,
    pub calls: C,
}

impl<S, C> ListWebhookCallsUseCase<S, C>
where
    S: SubscriptionRepository,
    C: WebhookCallRepository,
{
    /// Newest first.
    pub async fn execute(
        &self,
        team_id: TeamId,
        subscription_id: SubscriptionId,
        page: PageRequest,
    ) -> Result<Vec<WebhookCall>, DeliveryServiceError> {
        if self.subscriptions.find(team_id, subscription_id).await?.is_none() {
            return Err(DeliveryServiceError::SubscriptionNotFound);
        }
        self.calls
            .list_by_subscription(subscription_id, page.clamped())
            .await
    }
}

// ── GetWebhookCall ───────────────────────────────────────────────────────────

pub struct GetWebhookCallUseCase<C: WebhookCallRepository> {
    pub calls: C,
}

impl<C: WebhookCallRepository> GetWebhookCallUseCase<C> {
    pub async fn execute(
        &self,
        team_id: TeamId,
        id: WebhookCallId,
    ) -> Result<WebhookCall, DeliveryServiceError> {
        self.calls
            .find_by_id(id)
            .await?
            .filter(|c| c.team_id == team_id)
            .ok_or(DeliveryServiceError::WebhookCallNotFound)
    }
}
