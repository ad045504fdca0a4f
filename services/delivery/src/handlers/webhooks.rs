use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_core::identity::TeamHeaders;
use courier_domain::event::WebhookEventType;
use courier_domain::id::SubscriptionId;
use courier_domain::pagination::PageRequest;

use crate::domain::types::WebhookSubscription;
use crate::error::DeliveryServiceError;
use crate::handlers::webhook_calls::WebhookCallResponse;
use crate::state::AppState;
use crate::usecase::webhook_call::ListWebhookCallsUseCase;
use crate::usecase::webhook_subscription::{
    CreateSubscriptionInput, CreateSubscriptionUseCase, DeleteSubscriptionUseCase,
    GetSubscriptionUseCase, ListSubscriptionsUseCase, RotateSecretUseCase,
    UpdateSubscriptionInput, UpdateSubscriptionUseCase,
};

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: SubscriptionId,
    pub url: String,
    /// Plaintext on create and rotate, masked everywhere else.
    pub secret: String,
    pub event_types: Vec<WebhookEventType>,
    pub domain_ids: Vec<String>,
    pub enabled: bool,
    pub description: Option<String>,
    #[serde(serialize_with = "courier_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "courier_core::serde::to_rfc3339_ms")]
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionResponse {
    fn masked(subscription: WebhookSubscription) -> Self {
        let secret = subscription.masked_secret();
        Self::with_secret(subscription, secret)
    }

    fn revealed(subscription: WebhookSubscription) -> Self {
        let secret = subscription.secret.clone();
        Self::with_secret(subscription, secret)
    }

    fn with_secret(s: WebhookSubscription, secret: String) -> Self {
        Self {
            id: s.id,
            url: s.url,
            secret,
            event_types: s.event_types,
            domain_ids: s.domain_ids,
            enabled: s.enabled,
            description: s.description,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

pub(crate) fn parse_subscription_id(id: &str) -> Result<SubscriptionId, DeliveryServiceError> {
    id.parse()
        .map_err(|_| DeliveryServiceError::SubscriptionNotFound)
}

// ── POST /v1/webhooks ────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub url: String,
    #[serde(default)]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub domain_ids: Vec<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

pub async fn create_webhook(
    team: TeamHeaders,
    State(state): State<AppState>,
    Json(body): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), DeliveryServiceError> {
    let usecase = CreateSubscriptionUseCase {
        repo: state.subscription_repo(),
    };
    let subscription = usecase
        .execute(
            team.team_id,
            CreateSubscriptionInput {
                url: body.url,
                event_types: body.event_types,
                domain_ids: body.domain_ids,
                description: body.description,
                enabled: body.enabled.unwrap_or(true),
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::revealed(subscription)),
    ))
}

// ── GET /v1/webhooks ─────────────────────────────────────────────────────────

pub async fn list_webhooks(
    team: TeamHeaders,
    State(state): State<AppState>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Vec<SubscriptionResponse>>, DeliveryServiceError> {
    let usecase = ListSubscriptionsUseCase {
        repo: state.subscription_repo(),
    };
    let subscriptions = usecase.execute(team.team_id, page).await?;
    Ok(Json(
        subscriptions
            .into_iter()
            .map(SubscriptionResponse::masked)
            .collect(),
    ))
}

// ── GET /v1/webhooks/{id} ────────────────────────────────────────────────────

pub async fn get_webhook(
    team: TeamHeaders,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionResponse>, DeliveryServiceError> {
    let usecase = GetSubscriptionUseCase {
        repo: state.subscription_repo(),
    };
    let subscription = usecase
        .execute(team.team_id, parse_subscription_id(&id)?)
        .await?;
    Ok(Json(SubscriptionResponse::masked(subscription)))
}

// ── PATCH /v1/webhooks/{id} ──────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubscriptionRequest {
    pub url: Option<String>,
    pub event_types: Option<Vec<String>>,
    pub domain_ids: Option<Vec<String>>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
}

pub async fn update_webhook(
    team: TeamHeaders,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateSubscriptionRequest>,
) -> Result<Json<SubscriptionResponse>, DeliveryServiceError> {
    let usecase = UpdateSubscriptionUseCase {
        repo: state.subscription_repo(),
        calls: state.webhook_call_repo(),
    };
    let subscription = usecase
        .execute(
            team.team_id,
            parse_subscription_id(&id)?,
            UpdateSubscriptionInput {
                url: body.url,
                event_types: body.event_types,
                domain_ids: body.domain_ids,
                enabled: body.enabled,
                description: body.description,
            },
        )
        .await?;
    Ok(Json(SubscriptionResponse::masked(subscription)))
}

// ── DELETE /v1/webhooks/{id} ─────────────────────────────────────────────────

pub async fn delete_webhook(
    team: TeamHeaders,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, DeliveryServiceError> {
    let usecase = DeleteSubscriptionUseCase {
        repo: state.subscription_repo(),
        calls: state.webhook_call_repo(),
    };
    usecase
        .execute(team.team_id, parse_subscription_id(&id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── POST /v1/webhooks/{id}/secret ────────────────────────────────────────────

pub async fn rotate_webhook_secret(
    team: TeamHeaders,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SubscriptionResponse>, DeliveryServiceError> {
    let usecase = RotateSecretUseCase {
        repo: state.subscription_repo(),
    };
    let subscription = usecase
        .execute(team.team_id, parse_subscription_id(&id)?)
        .await?;
    Ok(Json(SubscriptionResponse::revealed(subscription)))
}

// ── GET /v1/webhooks/{id}/calls ──────────────────────────────────────────────

pub async fn list_webhook_calls(
    team: TeamHeaders,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Vec<WebhookCallResponse>>, DeliveryServiceError> {
    let usecase = ListWebhookCallsUseCase {
        subscriptions: state.subscription_repo(),
        calls: state.webhook_call_repo(),
    };
    let calls = usecase
        .execute(team.team_id, parse_subscription_id(&id)?, page)
        .await?;
    Ok(Json(calls.into_iter().map(WebhookCallResponse::from).collect()))
}
