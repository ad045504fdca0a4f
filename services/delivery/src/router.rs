use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use courier_core::health::healthz;
use courier_core::middleware::{propagate_request_id_layer, request_id_layer, trace_layer};

use crate::handlers::{
    emails::send_email,
    health::readyz,
    inbound::receive_notification,
    webhook_calls::{get_webhook_call, retry_webhook_call},
    webhooks::{
        create_webhook, delete_webhook, get_webhook, list_webhook_calls, list_webhooks,
        rotate_webhook_secret, update_webhook,
    },
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Emails
        .route("/v1/emails", post(send_email))
        // Webhook subscriptions
        .route("/v1/webhooks", get(list_webhooks).post(create_webhook))
        .route(
            "/v1/webhooks/{id}",
            get(get_webhook).patch(update_webhook).delete(delete_webhook),
        )
        .route("/v1/webhooks/{id}/secret", post(rotate_webhook_secret))
        .route("/v1/webhooks/{id}/calls", get(list_webhook_calls))
        // Webhook calls
        .route("/v1/webhook-calls/{id}", get(get_webhook_call))
        .route("/v1/webhook-calls/{id}/retry", post(retry_webhook_call))
        // Inbound provider notifications
        .route("/v1/inbound/notifications", post(receive_notification))
        .layer(
            ServiceBuilder::new()
                .layer(request_id_layer())
                .layer(trace_layer())
                .layer(propagate_request_id_layer()),
        )
        .with_state(state)
}
