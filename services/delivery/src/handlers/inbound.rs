use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::domain::types::InboundNotification;
use crate::error::DeliveryServiceError;
use crate::state::AppState;
use crate::usecase::inbound::EnqueueInboundUseCase;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundAccepted {
    pub job_id: String,
    pub duplicate: bool,
}

// ── POST /v1/inbound/notifications ───────────────────────────────────────────

pub async fn receive_notification(
    State(state): State<AppState>,
    Json(body): Json<InboundNotification>,
) -> Result<(StatusCode, Json<InboundAccepted>), DeliveryServiceError> {
    let usecase = EnqueueInboundUseCase {
        jobs: state.job_queue(),
    };
    let enqueued = usecase.execute(&body).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(InboundAccepted {
            job_id: enqueued.job_id().to_string(),
            duplicate: enqueued.is_duplicate(),
        }),
    ))
}
