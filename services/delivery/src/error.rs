use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use courier_core::error::error_response;

/// Delivery service error variants.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryServiceError {
    #[error("idempotency key was already used with a different request body")]
    IdempotencyKeyReused,
    #[error("a request with this idempotency key is still in progress")]
    IdempotencyRequestInProgress,
    #[error("idempotency key must be 1 to 256 characters")]
    InvalidIdempotencyKey,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("webhook not found")]
    SubscriptionNotFound,
    #[error("webhook call not found")]
    WebhookCallNotFound,
    #[error("webhook url must be an absolute http or https url")]
    InvalidWebhookUrl,
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
    #[error("webhook call cannot be retried from status {0}")]
    CallNotRetryable(&'static str),
    #[error("webhook is disabled")]
    WebhookDisabled,
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("mail provider rejected the message")]
    MailProvider(#[source] anyhow::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl DeliveryServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IdempotencyKeyReused => "IDEMPOTENCY_KEY_REUSED",
            Self::IdempotencyRequestInProgress => "IDEMPOTENCY_REQUEST_IN_PROGRESS",
            Self::InvalidIdempotencyKey => "INVALID_IDEMPOTENCY_KEY",
            Self::RateLimited => "RATE_LIMITED",
            Self::SubscriptionNotFound => "WEBHOOK_NOT_FOUND",
            Self::WebhookCallNotFound => "WEBHOOK_CALL_NOT_FOUND",
            Self::InvalidWebhookUrl => "INVALID_WEBHOOK_URL",
            Self::UnknownEventType(_) => "UNKNOWN_EVENT_TYPE",
            Self::CallNotRetryable(_) => "WEBHOOK_CALL_NOT_RETRYABLE",
            Self::WebhookDisabled => "WEBHOOK_DISABLED",
            Self::InvalidSchedule(_) => "INVALID_SCHEDULE",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::MailProvider(_) => "MAIL_PROVIDER_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the same request may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IdempotencyRequestInProgress
                | Self::RateLimited
                | Self::MailProvider(_)
                | Self::Internal(_)
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::IdempotencyKeyReused
            | Self::IdempotencyRequestInProgress
            | Self::CallNotRetryable(_)
            | Self::WebhookDisabled => StatusCode::CONFLICT,
            Self::InvalidIdempotencyKey
            | Self::InvalidWebhookUrl
            | Self::UnknownEventType(_)
            | Self::InvalidSchedule(_)
            | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::SubscriptionNotFound | Self::WebhookCallNotFound => StatusCode::NOT_FOUND,
            Self::MailProvider(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DeliveryServiceError {
    fn into_response(self) -> Response {
        // 4xx are expected and already visible through TraceLayer.
        match &self {
            Self::Internal(e) => tracing::error!(error = ?e, kind = "INTERNAL", "internal error"),
            Self::MailProvider(e) => {
                tracing::warn!(error = ?e, kind = "MAIL_PROVIDER_ERROR", "mail provider error")
            }
            _ => {}
        }
        let mut response = error_response(self.status(), self.kind(), &self.to_string());
        if matches!(
            self,
            Self::IdempotencyRequestInProgress | Self::RateLimited
        ) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
