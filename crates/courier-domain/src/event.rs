//! Webhook event catalogue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every event a team can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WebhookEventType {
    #[serde(rename = "email.queued")]
    EmailQueued,
    #[serde(rename = "email.sent")]
    EmailSent,
    #[serde(rename = "email.delivery_delayed")]
    EmailDeliveryDelayed,
    #[serde(rename = "email.delivered")]
    EmailDelivered,
    #[serde(rename = "email.bounced")]
    EmailBounced,
    #[serde(rename = "email.rejected")]
    EmailRejected,
    #[serde(rename = "email.rendering_failure")]
    EmailRenderingFailure,
    #[serde(rename = "email.complained")]
    EmailComplained,
    #[serde(rename = "email.failed")]
    EmailFailed,
    #[serde(rename = "email.cancelled")]
    EmailCancelled,
    #[serde(rename = "email.suppressed")]
    EmailSuppressed,
    #[serde(rename = "email.opened")]
    EmailOpened,
    #[serde(rename = "email.clicked")]
    EmailClicked,
    #[serde(rename = "contact.created")]
    ContactCreated,
    #[serde(rename = "contact.updated")]
    ContactUpdated,
    #[serde(rename = "contact.deleted")]
    ContactDeleted,
    #[serde(rename = "domain.created")]
    DomainCreated,
    #[serde(rename = "domain.verified")]
    DomainVerified,
    #[serde(rename = "domain.updated")]
    DomainUpdated,
    #[serde(rename = "domain.deleted")]
    DomainDeleted,
}

impl WebhookEventType {
    pub const ALL: [WebhookEventType; 20] = [
        Self::EmailQueued,
        Self::EmailSent,
        Self::EmailDeliveryDelayed,
        Self::EmailDelivered,
        Self::EmailBounced,
        Self::EmailRejected,
        Self::EmailRenderingFailure,
        Self::EmailComplained,
        Self::EmailFailed,
        Self::EmailCancelled,
        Self::EmailSuppressed,
        Self::EmailOpened,
        Self::EmailClicked,
        Self::ContactCreated,
        Self::ContactUpdated,
        Self::ContactDeleted,
        Self::DomainCreated,
        Self::DomainVerified,
        Self::DomainUpdated,
        Self::DomainDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailQueued => "email.queued",
            Self::EmailSent => "email.sent",
            Self::EmailDeliveryDelayed => "email.delivery_delayed",
            Self::EmailDelivered => "email.delivered",
            Self::EmailBounced => "email.bounced",
            Self::EmailRejected => "email.rejected",
            Self::EmailRenderingFailure => "email.rendering_failure",
            Self::EmailComplained => "email.complained",
            Self::EmailFailed => "email.failed",
            Self::EmailCancelled => "email.cancelled",
            Self::EmailSuppressed => "email.suppressed",
            Self::EmailOpened => "email.opened",
            Self::EmailClicked => "email.clicked",
            Self::ContactCreated => "contact.created",
            Self::ContactUpdated => "contact.updated",
            Self::ContactDeleted => "contact.deleted",
            Self::DomainCreated => "domain.created",
            Self::DomainVerified => "domain.verified",
            Self::DomainUpdated => "domain.updated",
            Self::DomainDeleted => "domain.deleted",
        }
    }

    /// Email events are scoped to a sending domain; contact and domain events are not.
    pub fn is_email_event(&self) -> bool {
        self.as_str().starts_with("email.")
    }
}

impl fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known webhook event type.
#[derive(Debug, Error)]
#[error("unknown webhook event type: {0:?}")]
pub struct UnknownEventType(pub String);

impl FromStr for WebhookEventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_owned()))
    }
}
