use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use courier_core::identity::TeamHeaders;
use courier_domain::event::WebhookEventType;
use courier_domain::id::{EventId, SubscriptionId, WebhookCallId};

use crate::domain::types::{WebhookCall, WebhookCallStatus};
use crate::error::DeliveryServiceError;
use crate::state::AppState;
use crate::usecase::webhook_call::GetWebhookCallUseCase;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCallResponse {
    pub id: WebhookCallId,
    pub webhook_id: SubscriptionId,
    pub event_id: EventId,
    #[serde(rename = "type")]
    pub event_type: WebhookEventType,
    pub status: WebhookCallStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(serialize_with = "courier_core::serde::option_to_rfc3339_ms")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i64>,
    pub last_error: Option<String>,
    pub payload: serde_json::Value,
    #[serde(serialize_with = "courier_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "courier_core::serde::option_to_rfc3339_ms")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "courier_core::serde::to_rfc3339_ms")]
    pub updated_at: DateTime<Utc>,
}

impl From<WebhookCall> for WebhookCallResponse {
    fn from(c: WebhookCall) -> Self {
        Self {
            id: c.id,
            webhook_id: c.subscription_id,
            event_id: c.event_id,
            event_type: c.event_type,
            status: c.status,
            attempt: c.attempt,
            max_attempts: c.max_attempts,
            next_attempt_at: c.next_attempt_at,
            response_status: c.response_status,
            response_body: c.response_body,
            response_time_ms: c.response_time_ms,
            last_error: c.last_error,
            payload: c.payload,
            created_at: c.created_at,
            last_attempt_at: c.last_attempt_at,
            updated_at: c.updated_at,
        }
    }
}

fn parse_call_id(id: &str) -> Result<WebhookCallId, DeliveryServiceError> {
    id.parse()
        .map_err(|_| DeliveryServiceError::WebhookCallNotFound)
}

// ── GET /v1/webhook-calls/{id} ───────────────────────────────────────────────

pub async fn get_webhook_call(
    team: TeamHeaders,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WebhookCallResponse>, DeliveryServiceError> {
    let usecase = GetWebhookCallUseCase {
        calls: state.webhook_call_repo(),
    };
    let call = usecase.execute(team.team_id, parse_call_id(&id)?).await?;
    Ok(Json(call.into()))
}

// ── POST /v1/webhook-calls/{id}/retry ────────────────────────────────────────

pub async fn retry_webhook_call(
    team: TeamHeaders,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WebhookCallResponse>, DeliveryServiceError> {
    let tracker = state.delivery_tracker();
    let call = tracker
        .retry_now(team.team_id, parse_call_id(&id)?)
        .await?;
    Ok(Json(call.into()))
}
