/// `v1=<hex hmac-sha256>` over `"{timestamp}.{raw body}"`.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Courier-Signature";
/// Milliseconds since the Unix epoch at signing time.
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "X-Courier-Timestamp";
/// Event type, e.g. `email.delivered`.
pub const WEBHOOK_EVENT_HEADER: &str = "X-Courier-Event";
/// Delivery record id. Stable across retries of one call, distinct from the event id.
pub const WEBHOOK_CALL_HEADER: &str = "X-Courier-Call";

pub const SIGNATURE_PREFIX: &str = "v1=";
