use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::Mac;
use http::HeaderMap;

use crate::event::WebhookEvent;
use crate::headers::{SIGNATURE_PREFIX, WEBHOOK_SIGNATURE_HEADER, WEBHOOK_TIMESTAMP_HEADER};
use crate::signature::mac_for;

/// Default replay window: 5 minutes either side of the receiver's clock.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(5 * 60);

/// Why a delivery was rejected. Each verification step has its own code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebhookVerificationErrorCode {
    MissingSignature,
    InvalidSignatureFormat,
    MissingTimestamp,
    InvalidTimestamp,
    TimestampOutOfRange,
    InvalidBody,
    SignatureMismatch,
    InvalidJson,
}

impl WebhookVerificationErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingSignature => "MISSING_SIGNATURE",
            Self::InvalidSignatureFormat => "INVALID_SIGNATURE_FORMAT",
            Self::MissingTimestamp => "MISSING_TIMESTAMP",
            Self::InvalidTimestamp => "INVALID_TIMESTAMP",
            Self::TimestampOutOfRange => "TIMESTAMP_OUT_OF_RANGE",
            Self::InvalidBody => "INVALID_BODY",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::InvalidJson => "INVALID_JSON",
        }
    }
}

impl fmt::Display for WebhookVerificationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct WebhookVerificationError {
    pub code: WebhookVerificationErrorCode,
    pub message: String,
}

impl WebhookVerificationError {
    fn new(code: WebhookVerificationErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Allowed distance between the signing timestamp and the receiver's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tolerance {
    Within(Duration),
    /// Skip the replay-window check entirely. Only for replaying archived
    /// deliveries in tests or tooling.
    Disabled,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::Within(DEFAULT_TOLERANCE)
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyOptions<'a> {
    /// Overrides the secret the [`Webhooks`] was built with (e.g. during rotation).
    pub secret: Option<&'a str>,
    pub tolerance: Tolerance,
}

/// Receiver-side verifier bound to one signing secret.
#[derive(Clone)]
pub struct Webhooks {
    secret: String,
}

impl fmt::Debug for Webhooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Webhooks").field("secret", &"<redacted>").finish()
    }
}

impl Webhooks {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// `true` when the signature is authentic and fresh. Does not parse the body.
    pub fn verify(&self, body: &[u8], headers: &HeaderMap, options: VerifyOptions<'_>) -> bool {
        self.verify_at(body, headers, options, now_ms()).is_ok()
    }

    /// Verify, then parse the body into a [`WebhookEvent`].
    pub fn construct_event(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        options: VerifyOptions<'_>,
    ) -> Result<WebhookEvent, WebhookVerificationError> {
        self.construct_event_at(body, headers, options, now_ms())
    }

    /// [`Webhooks::construct_event`] against an explicit clock (milliseconds since epoch).
    pub fn construct_event_at(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        options: VerifyOptions<'_>,
        now_ms: i64,
    ) -> Result<WebhookEvent, WebhookVerificationError> {
        self.verify_at(body, headers, options, now_ms)?;
        serde_json::from_slice(body).map_err(|e| {
            WebhookVerificationError::new(
                WebhookVerificationErrorCode::InvalidJson,
                format!("webhook payload is not valid JSON: {e}"),
            )
        })
    }

    /// Run every verification step against an explicit clock.
    pub fn verify_at(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        options: VerifyOptions<'_>,
        now_ms: i64,
    ) -> Result<(), WebhookVerificationError> {
        use WebhookVerificationErrorCode as Code;

        let secret = options.secret.unwrap_or(&self.secret);

        let signature = header(headers, WEBHOOK_SIGNATURE_HEADER).ok_or_else(|| {
            WebhookVerificationError::new(
                Code::MissingSignature,
                format!("missing {WEBHOOK_SIGNATURE_HEADER} header"),
            )
        })?;
        let signature_hex = signature.strip_prefix(SIGNATURE_PREFIX).ok_or_else(|| {
            WebhookVerificationError::new(
                Code::InvalidSignatureFormat,
                format!("signature header must start with {SIGNATURE_PREFIX}"),
            )
        })?;

        let timestamp = header(headers, WEBHOOK_TIMESTAMP_HEADER).ok_or_else(|| {
            WebhookVerificationError::new(
                Code::MissingTimestamp,
                format!("missing {WEBHOOK_TIMESTAMP_HEADER} header"),
            )
        })?;
        let timestamp_ms: i64 = timestamp.trim().parse().map_err(|_| {
            WebhookVerificationError::new(
                Code::InvalidTimestamp,
                "timestamp header must be a number (milliseconds since epoch)",
            )
        })?;

        if let Tolerance::Within(window) = options.tolerance {
            let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
            if now_ms.abs_diff(timestamp_ms) > window_ms.unsigned_abs() {
                return Err(WebhookVerificationError::new(
                    Code::TimestampOutOfRange,
                    "webhook timestamp is outside the allowed tolerance",
                ));
            }
        }

        if std::str::from_utf8(body).is_err() {
            return Err(WebhookVerificationError::new(
                Code::InvalidBody,
                "webhook body must be valid UTF-8",
            ));
        }

        let mismatch = || {
            WebhookVerificationError::new(Code::SignatureMismatch, "webhook signature does not match")
        };
        let provided = hex::decode(signature_hex).map_err(|_| mismatch())?;
        // verify_slice compares in constant time.
        mac_for(secret, timestamp, body)
            .verify_slice(&provided)
            .map_err(|_| mismatch())
    }
}

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
