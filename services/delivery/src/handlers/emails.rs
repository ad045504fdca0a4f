use axum::{Json, extract::State, http::HeaderMap};

use courier_core::identity::TeamHeaders;

use crate::domain::types::OutboundEmail;
use crate::error::DeliveryServiceError;
use crate::state::AppState;
use crate::usecase::email::{SendEmailUseCase, SentEmail};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

fn idempotency_key(headers: &HeaderMap) -> Result<Option<&str>, DeliveryServiceError> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|v| v.to_str().map_err(|_| DeliveryServiceError::InvalidIdempotencyKey))
        .transpose()
}

// ── POST /v1/emails ──────────────────────────────────────────────────────────

pub async fn send_email(
    team: TeamHeaders,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<OutboundEmail>,
) -> Result<Json<SentEmail>, DeliveryServiceError> {
    let usecase = SendEmailUseCase {
        rate_limiter: state.send_rate_limiter(),
        idempotency: state.idempotency_service(),
        provider: state.mail_provider(),
        emitter: state.webhook_emitter(),
    };
    let sent = usecase
        .execute(team.team_id, idempotency_key(&headers)?, body)
        .await?;
    Ok(Json(sent))
}
