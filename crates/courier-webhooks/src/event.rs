use serde::{Deserialize, Serialize};

use courier_domain::event::WebhookEventType;

/// Payload schema version sent in every delivery body.
pub const WEBHOOK_PROTOCOL_VERSION: &str = "2024-11-01";

/// JSON body of one webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    /// Event id. Identical across every attempt and every subscription.
    pub id: String,
    /// Kept as a string so receivers on an older SDK still accept new event types.
    #[serde(rename = "type")]
    pub event_type: String,
    pub version: String,
    /// RFC 3339 with millisecond precision.
    pub created_at: String,
    pub team_id: i64,
    pub data: serde_json::Value,
    /// 1-based attempt number of this delivery.
    pub attempt: u32,
}

impl WebhookEvent {
    /// The typed event kind, or `None` for types this SDK does not know yet.
    pub fn kind(&self) -> Option<WebhookEventType> {
        self.event_type.parse().ok()
    }
}
