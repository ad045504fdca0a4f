use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::headers::{
    SIGNATURE_PREFIX, WEBHOOK_CALL_HEADER, WEBHOOK_EVENT_HEADER, WEBHOOK_SIGNATURE_HEADER,
    WEBHOOK_TIMESTAMP_HEADER,
};

pub(crate) type HmacSha256 = Hmac<Sha256>;

pub(crate) fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    mac
}

/// Compute the `X-Courier-Signature` value for a delivery.
///
/// The MAC covers `"{timestamp_ms}.{raw body}"` byte for byte.
pub fn sign(secret: &str, timestamp_ms: i64, body: &[u8]) -> String {
    let digest = mac_for(secret, &timestamp_ms.to_string(), body)
        .finalize()
        .into_bytes();
    format!("{SIGNATURE_PREFIX}{}", hex::encode(digest))
}

/// The four headers attached to every outbound delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub signature: String,
    pub timestamp: String,
    pub event_type: String,
    pub call_id: String,
}

impl SignedHeaders {
    pub fn new(
        secret: &str,
        timestamp_ms: i64,
        body: &[u8],
        event_type: impl Into<String>,
        call_id: impl Into<String>,
    ) -> Self {
        Self {
            signature: sign(secret, timestamp_ms, body),
            timestamp: timestamp_ms.to_string(),
            event_type: event_type.into(),
            call_id: call_id.into(),
        }
    }

    /// `(name, value)` pairs in a stable order.
    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            (WEBHOOK_SIGNATURE_HEADER, self.signature.as_str()),
            (WEBHOOK_TIMESTAMP_HEADER, self.timestamp.as_str()),
            (WEBHOOK_EVENT_HEADER, self.event_type.as_str()),
            (WEBHOOK_CALL_HEADER, self.call_id.as_str()),
        ]
    }
}
