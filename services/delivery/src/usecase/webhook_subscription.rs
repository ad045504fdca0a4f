use chrono::Utc;
use rand::RngExt;

use courier_domain::event::WebhookEventType;
use courier_domain::id::{SubscriptionId, TeamId};
use courier_domain::pagination::PageRequest;

use crate::domain::repository::{SubscriptionRepository, WebhookCallRepository};
use crate::domain::types::{WEBHOOK_SECRET_PREFIX, WEBHOOK_SECRET_RANDOM_LEN, WebhookSubscription};
use crate::error::DeliveryServiceError;

const SECRET_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// `whsec_` followed by random alphanumerics.
pub fn generate_secret() -> String {
    let mut rng = rand::rng();
    let random: String = (0..WEBHOOK_SECRET_RANDOM_LEN)
        .map(|_| char::from(SECRET_ALPHABET[rng.random_range(0..SECRET_ALPHABET.len())]))
        .collect();
    format!("{WEBHOOK_SECRET_PREFIX}{random}")
}

fn validate_url(url: &str) -> Result<String, DeliveryServiceError> {
    let parsed = reqwest::Url::parse(url.trim()).map_err(|_| DeliveryServiceError::InvalidWebhookUrl)?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(DeliveryServiceError::InvalidWebhookUrl);
    }
    Ok(parsed.to_string())
}

/// Parse and deduplicate event type names, keeping first-seen order.
fn parse_event_types(names: &[String]) -> Result<Vec<WebhookEventType>, DeliveryServiceError> {
    let mut types = Vec::with_capacity(names.len());
    for name in names {
        let event_type: WebhookEventType = name
            .parse()
            .map_err(|_| DeliveryServiceError::UnknownEventType(name.clone()))?;
        if !types.contains(&event_type) {
            types.push(event_type);
        }
    }
    Ok(types)
}

fn normalise_domain_ids(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim().to_owned();
        if !id.is_empty() && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

// ── CreateSubscription ───────────────────────────────────────────────────────

pub struct CreateSubscriptionInput {
    pub url: String,
    pub event_types: Vec<String>,
    pub domain_ids: Vec<String>,
    pub description: Option<String>,
    pub enabled: bool,
}

pub struct CreateSubscriptionUseCase<R: SubscriptionRepository> {
    pub repo: R,
}

impl<R: SubscriptionRepository> CreateSubscriptionUseCase<R> {
    /// The returned subscription carries the plaintext secret.
    pub async fn execute(
        &self,
        team_id: TeamId,
        input: CreateSubscriptionInput,
    ) -> Result<WebhookSubscription, DeliveryServiceError> {
        let now = Utc::now();
        let subscription = WebhookSubscription {
            id: SubscriptionId::new(),
            team_id,
            url: validate_url(&input.url)?,
            secret: generate_secret(),
            event_types: parse_event_types(&input.event_types)?,
            domain_ids: normalise_domain_ids(input.domain_ids),
            enabled: input.enabled,
            description: input.description,
            created_at: now,
            updated_at: now,
        };
        self.repo.create(&subscription).await?;
        tracing::info!(
            team_id = %team_id,
            subscription_id = %subscription.id,
            url = %subscription.url,
            "webhook subscription created"
        );
        Ok(subscription)
    }
}

// ── ListSubscriptions ────────────────────────────────────────────────────────

pub struct ListSubscriptionsUseCase<R: SubscriptionRepository> {
    pub repo: R,
}

impl<R: SubscriptionRepository> ListSubscriptionsUseCase<R> {
    pub async fn execute(
        &self,
        team_id: TeamId,
        page: PageRequest,
    ) -> Result<Vec<WebhookSubscription>, DeliveryServiceError> {
        self.repo.list_by_team(team_id, page.clamped()).await
    }
}

// ── GetSubscription ──────────────────────────────────────────────────────────

pub struct GetSubscriptionUseCase<R: SubscriptionRepository> {
    pub repo: R,
}

impl<R: SubscriptionRepository> GetSubscriptionUseCase<R> {
    pub async fn execute(
        &self,
        team_id: TeamId,
        id: SubscriptionId,
    ) -> Result<WebhookSubscription, DeliveryServiceError> {
        self.repo
            .find(team_id, id)
            .await?
            .ok_or(DeliveryServiceError::SubscriptionNotFound)
    }
}

// ── UpdateSubscription ───────────────────────────────────────────────────────

/// Fields left `None` keep their current value.
#[derive(Default)]
pub struct UpdateSubscriptionInput {
    pub url: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub domain_ids: Option<Vec<String>>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
}

pub struct UpdateSubscriptionUseCase<R, C>
where
    R: SubscriptionRepository,
    C: WebhookCallRepository,
{
    pub repo: R,
    pub calls: C,
}

impl<R, C> UpdateSubscriptionUseCase<R, C>
where
    R: SubscriptionRepository,
    C: WebhookCallRepository,
{
    pub async fn execute(
        &self,
        team_id: TeamId,
        id: SubscriptionId,
        input: UpdateSubscriptionInput,
    ) -> Result<WebhookSubscription, DeliveryServiceError> {
        let mut subscription = self
            .repo
            .find(team_id, id)
            .await?
            .ok_or(DeliveryServiceError::SubscriptionNotFound)?;
        let was_enabled = subscription.enabled;

        if let Some(url) = input.url {
            subscription.url = validate_url(&url)?;
        }
        if let Some(names) = input.event_types {
            subscription.event_types = parse_event_types(&names)?;
        }
        if let Some(ids) = input.domain_ids {
            subscription.domain_ids = normalise_domain_ids(ids);
        }
        if let Some(enabled) = input.enabled {
            subscription.enabled = enabled;
        }
        if let Some(description) = input.description {
            subscription.description = Some(description).filter(|d| !d.is_empty());
        }
        let now = Utc::now();
        subscription.updated_at = now;

        if !self.repo.update(&subscription).await? {
            return Err(DeliveryServiceError::SubscriptionNotFound);
        }

        if was_enabled && !subscription.enabled {
            let discarded = self
                .calls
                .discard_open_for_subscription(id, "webhook disabled", now)
                .await?;
            tracing::info!(
                team_id = %team_id,
                subscription_id = %id,
                discarded,
                "webhook subscription disabled"
            );
        }
        Ok(subscription)
    }
}

// ── DeleteSubscription ───────────────────────────────────────────────────────

pub struct DeleteSubscriptionUseCase<R, C>
where
    R: SubscriptionRepository,
    C: WebhookCallRepository,
{
    pub repo: R,
    pub calls: C,
}

impl<R, C> DeleteSubscriptionUseCase<R, C>
where
    R: SubscriptionRepository,
    C: WebhookCallRepository,
{
    pub async fn execute(
        &self,
        team_id: TeamId,
        id: SubscriptionId,
    ) -> Result<(), DeliveryServiceError> {
        if !self.repo.delete(team_id, id).await? {
            return Err(DeliveryServiceError::SubscriptionNotFound);
        }
        let discarded = self
            .calls
            .discard_open_for_subscription(id, "webhook deleted", Utc::now())
            .await?;
        tracing::info!(
            team_id = %team_id,
            subscription_id = %id,
            discarded,
            "webhook subscription deleted"
        );
        Ok(())
    }
}

// ── RotateSecret ─────────────────────────────────────────────────────────────

pub struct RotateSecretUseCase<R: SubscriptionRepository> {
    pub repo: R,
}

impl<R: SubscriptionRepository> RotateSecretUseCase<R> {
    /// Calls already in flight keep signing with whichever secret they load.
    pub async fn execute(
        &self,
        team_id: TeamId,
        id: SubscriptionId,
    ) -> Result<WebhookSubscription, DeliveryServiceError> {
        let mut subscription = self
            .repo
            .find(team_id, id)
            .await?
            .ok_or(DeliveryServiceError::SubscriptionNotFound)?;
        subscription.secret = generate_secret();
        subscription.updated_at = Utc::now();
        if !self.repo.update(&subscription).await? {
            return Err(DeliveryServiceError::SubscriptionNotFound);
        }
        tracing::info!(team_id = %team_id, subscription_id = %id, "webhook secret rotated");
        Ok(subscription)
    }
}
