use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_domain::event::WebhookEventType;
use courier_domain::id::{EventId, JobId, SubscriptionId, TeamId, WebhookCallId};

// ── Idempotency ──────────────────────────────────────────────────────────────

/// Longest accepted `Idempotency-Key` header value.
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 256;

/// Result of a completed idempotent request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub team_id: TeamId,
    pub key: String,
    /// Lowercase hex SHA-256 of the canonical request payload.
    pub payload_hash: String,
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ── Webhook subscriptions ────────────────────────────────────────────────────

pub const WEBHOOK_SECRET_PREFIX: &str = "whsec_";
pub const WEBHOOK_SECRET_RANDOM_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookSubscription {
    pub id: SubscriptionId,
    pub team_id: TeamId,
    pub url: String,
    pub secret: String,
    /// Empty means every event type.
    pub event_types: Vec<WebhookEventType>,
    /// Empty means every sending domain.
    pub domain_ids: Vec<String>,
    pub enabled: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookSubscription {
    /// Whether an event should produce a call for this subscription.
    ///
    /// Events without a domain only match subscriptions with no domain scope.
    pub fn matches(&self, event_type: WebhookEventType, domain_id: Option<&str>) -> bool {
        if !self.enabled {
            return false;
        }
        let type_ok = self.event_types.is_empty() || self.event_types.contains(&event_type);
        let domain_ok = self.domain_ids.is_empty()
            || domain_id.is_some_and(|d| self.domain_ids.iter().any(|s| s == d));
        type_ok && domain_ok
    }

    /// `whsec_abcd…wxyz`; the plaintext secret is only shown on create and rotate.
    pub fn masked_secret(&self) -> String {
        let tail: String = self
            .secret
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("{WEBHOOK_SECRET_PREFIX}…{tail}")
    }
}

// ── Webhook calls ────────────────────────────────────────────────────────────

/// Response bodies are stored truncated to this many characters.
pub const RESPONSE_BODY_MAX_CHARS: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookCallStatus {
    Pending,
    InProgress,
    Delivered,
    Failed,
    Discarded,
}

impl WebhookCallStatus {
    /// Statuses an automatic attempt may start from.
    pub const AUTOMATIC_RETRY_FROM: [WebhookCallStatus; 2] = [Self::Pending, Self::Failed];
    /// Statuses an operator-triggered retry may start from.
    pub const MANUAL_RETRY_FROM: [WebhookCallStatus; 2] = [Self::Failed, Self::Discarded];
    /// Statuses a disabled or deleted subscription discards.
    pub const OPEN: [WebhookCallStatus; 2] = [Self::Pending, Self::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Delivered => "DELIVERED",
            Self::Failed => "FAILED",
            Self::Discarded => "DISCARDED",
        }
    }

    /// Allowed edges of the delivery state machine.
    pub fn can_transition_to(self, next: WebhookCallStatus) -> bool {
        use WebhookCallStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Discarded)
                | (InProgress, Delivered)
                | (InProgress, Failed)
                | (InProgress, Discarded)
                | (Failed, InProgress)
                | (Failed, Discarded)
                | (Discarded, InProgress)
        )
    }
}

impl fmt::Display for WebhookCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookCallStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "DELIVERED" => Ok(Self::Delivered),
            "FAILED" => Ok(Self::Failed),
            "DISCARDED" => Ok(Self::Discarded),
            other => Err(anyhow::anyhow!("unknown webhook call status {other:?}")),
        }
    }
}

/// One event addressed to one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookCall {
    pub id: WebhookCallId,
    pub subscription_id: SubscriptionId,
    pub team_id: TeamId,
    pub event_id: EventId,
    pub event_type: WebhookEventType,
    /// Immutable snapshot; every attempt resends it unchanged.
    pub payload: serde_json::Value,
    pub status: WebhookCallStatus,
    /// Attempts started so far. Only ever increases.
    pub attempt: u32,
    pub max_attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookCall {
    pub fn new_pending(
        subscription: &WebhookSubscription,
        event_id: EventId,
        event_type: WebhookEventType,
        payload: serde_json::Value,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WebhookCallId::new(),
            subscription_id: subscription.id,
            team_id: subscription.team_id,
            event_id,
            event_type,
            payload,
            status: WebhookCallStatus::Pending,
            attempt: 0,
            max_attempts,
            next_attempt_at: Some(now),
            response_status: None,
            response_body: None,
            response_time_ms: None,
            last_error: None,
            created_at: now,
            last_attempt_at: None,
            updated_at: now,
        }
    }
}

/// What one HTTP attempt produced. Transport failures leave `status` empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeliveryResponse {
    pub status: Option<u16>,
    pub body: Option<String>,
    pub elapsed_ms: i64,
    pub error: Option<String>,
}

impl DeliveryResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_some_and(|s| (200..300).contains(&s))
    }
}

/// Persisted outcome of an attempt, applied only while the call is still
/// `IN_PROGRESS` at the attempt that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptResult {
    pub status: WebhookCallStatus,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i64>,
    pub last_error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Outbound HTTP request for one attempt.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Vec<(&'static str, String)>,
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}

// ── Jobs ─────────────────────────────────────────────────────────────────────

pub const WEBHOOK_DELIVERY_QUEUE: &str = "webhook-delivery";
pub const WEBHOOK_RECOVERY_QUEUE: &str = "webhook-recovery";
pub const INBOUND_MESSAGES_QUEUE: &str = "inbound-messages";
pub const CLEANUP_QUEUE: &str = "cleanup";

pub const WEBHOOK_RECOVERY_SCHEDULE: &str = "0 * * * * *";
pub const CLEANUP_SCHEDULE: &str = "0 0 3 * * *";

pub const DEFAULT_JOB_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(anyhow::anyhow!("unknown job status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub job_key: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Attempts started, including the current one while running.
    pub attempts: u32,
    pub max_attempts: u32,
    pub run_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub queue: String,
    pub job_key: String,
    pub payload: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub max_attempts: u32,
}

/// Result of an enqueue. A duplicate `(queue, job_key)` returns the existing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Created(JobId),
    Duplicate(JobId),
}

impl Enqueued {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Created(id) | Self::Duplicate(id) => *id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobSchedule {
    pub queue: String,
    pub schedule_name: String,
    pub cron_pattern: String,
    pub timezone: String,
    pub payload: serde_json::Value,
    pub next_run_at: DateTime<Utc>,
}

// ── Email ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reply_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
}

/// Mail-provider notification about a previously sent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundNotification {
    /// Provider id of the sent mail, shared by every notification about it.
    pub message_id: String,
    /// Provider id of this notification, when the provider assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<String>,
    pub team_id: TeamId,
    /// Provider notification type, e.g. `Delivery`, `Bounce`, `Complaint`.
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(default)]
    pub email_id: Option<String>,
    #[serde(default)]
    pub domain_id: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl InboundNotification {
    /// Dedup key: provider redeliveries of one notification share it, while
    /// the other notifications about the same mail get their own.
    pub fn job_key(&self) -> String {
        match &self.notification_id {
            Some(id) => format!("{}:{}:{id}", self.message_id, self.notification_type),
            None => format!("{}:{}", self.message_id, self.notification_type),
        }
    }
}
