//! Courier webhook signing and verification.
//!
//! The delivery service signs every outbound webhook with
//! [`sign`]; receivers verify with [`Webhooks::construct_event`]:
//!
//! ```no_run
//! use courier_webhooks::{VerifyOptions, Webhooks};
//!
//! # fn handle(body: &[u8], headers: &http::HeaderMap) -> Result<(), Box<dyn std::error::Error>> {
//! let webhooks = Webhooks::new("whsec_xxx");
//! let event = webhooks.construct_event(body, headers, VerifyOptions::default())?;
//! if event.event_type == "email.delivered" {
//!     println!("delivered: {}", event.data["id"]);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Signatures cover the exact raw body bytes, so verify before any JSON
//! re-serialization.

pub mod event;
pub mod headers;
pub mod signature;
pub mod verify;

pub use event::{WEBHOOK_PROTOCOL_VERSION, WebhookEvent};
pub use headers::{
    SIGNATURE_PREFIX, WEBHOOK_CALL_HEADER, WEBHOOK_EVENT_HEADER, WEBHOOK_SIGNATURE_HEADER,
    WEBHOOK_TIMESTAMP_HEADER,
};
pub use signature::{SignedHeaders, sign};
pub use verify::{
    DEFAULT_TOLERANCE, Tolerance, VerifyOptions, WebhookVerificationError,
    WebhookVerificationErrorCode, Webhooks,
};
