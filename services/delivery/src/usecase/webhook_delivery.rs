use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_core::serde::format_rfc3339_ms;
use courier_domain::id::{TeamId, WebhookCallId};
use courier_webhooks::{SignedHeaders, WEBHOOK_PROTOCOL_VERSION, WebhookEvent};

use crate::domain::repository::{
    JobRepository, SubscriptionRepository, WebhookCallRepository, WebhookTransport,
};
use crate::domain::types::{
    AttemptResult, DeliveryRequest, DeliveryResponse, WEBHOOK_DELIVERY_QUEUE, WebhookCall,
    WebhookCallStatus, WebhookSubscription,
};
use crate::error::DeliveryServiceError;
use crate::usecase::backoff;
use crate::usecase::jobs::{EnqueueOptions, JobQueue};

/// Job key for attempt `attempt` (1-based) of a call.
pub fn delivery_job_key(call_id: WebhookCallId, attempt: u32) -> String {
    format!("call:{call_id}:attempt:{attempt}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJobPayload {
    pub call_id: WebhookCallId,
}

impl DeliveryJobPayload {
    pub fn to_value(self) -> serde_json::Value {
        serde_json::json!({ "callId": self.call_id })
    }
}

/// Backoff between delivery attempts of one call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Upper bound of random jitter as a fraction of the delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            max: Duration::from_secs(3600),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        backoff::with_jitter(backoff::exponential(self.base, self.max, attempt), self.jitter)
    }

    /// Persisted state after `attempt` produced `response`.
    pub fn outcome(
        &self,
        attempt: u32,
        max_attempts: u32,
        response: &DeliveryResponse,
        finished_at: DateTime<Utc>,
    ) -> AttemptResult {
        let (status, next_attempt_at) = if response.is_success() {
            (WebhookCallStatus::Delivered, None)
        } else if attempt < max_attempts {
            let delay = chrono::Duration::from_std(self.backoff(attempt))
                .unwrap_or(chrono::Duration::hours(1));
            (WebhookCallStatus::Failed, Some(finished_at + delay))
        } else {
            (WebhookCallStatus::Discarded, None)
        };
        AttemptResult {
            status,
            next_attempt_at,
            response_status: response.status,
            response_body: response.body.clone(),
            response_time_ms: Some(response.elapsed_ms),
            last_error: response.error.clone(),
            finished_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed { next_attempt_at: DateTime<Utc> },
    Discarded,
    /// The call is waiting for a later attempt.
    NotDue { next_attempt_at: DateTime<Utc> },
    /// Nothing to do: the call is gone, finished, or another worker claimed it.
    Skipped,
}

/// Drives calls through the delivery state machine.
///
/// Every transition is a conditional update on `(status, attempt)`, so any
/// number of workers may race on the same call and at most one performs a
/// given attempt.
pub struct WebhookDeliveryTracker<C, S, T, J>
where
    C: WebhookCallRepository,
    S: SubscriptionRepository,
    T: WebhookTransport,
    J: JobRepository,
{
    pub calls: C,
    pub subscriptions: S,
    pub transport: T,
    pub jobs: JobQueue<J>,
    pub retry: RetryPolicy,
}

impl<C, S, T, J> WebhookDeliveryTracker<C, S, T, J>
where
    C: WebhookCallRepository,
    S: SubscriptionRepository,
    T: WebhookTransport,
    J: JobRepository,
{
    /// Run the next automatic attempt of a call, if it is due.
    pub async fn deliver(&self, call_id: WebhookCallId) -> Result<DeliveryOutcome, DeliveryServiceError> {
        let Some(call) = self.calls.find_by_id(call_id).await? else {
            tracing::warn!(call_id = %call_id, "webhook call vanished before delivery");
            return Ok(DeliveryOutcome::Skipped);
        };
        if !WebhookCallStatus::AUTOMATIC_RETRY_FROM.contains(&call.status) {
            return Ok(DeliveryOutcome::Skipped);
        }

        let now = Utc::now();
        if call.status == WebhookCallStatus::Failed {
            if let Some(next_attempt_at) = call.next_attempt_at.filter(|at| *at > now) {
                return Ok(DeliveryOutcome::NotDue { next_attempt_at });
            }
        }

        if call.attempt >= call.max_attempts {
            return self.discard(&call, "attempts exhausted", now).await;
        }

        match self.subscriptions.find_by_id(call.subscription_id).await? {
            Some(subscription) if subscription.enabled => {
                self.attempt(&call, &subscription, &WebhookCallStatus::AUTOMATIC_RETRY_FROM)
                    .await
            }
            Some(_) => self.discard(&call, "webhook disabled", now).await,
            None => self.discard(&call, "webhook deleted", now).await,
        }
    }

    /// Operator-triggered attempt from `FAILED` or `DISCARDED`, run inline.
    /// Refused while the subscription is disabled.
    /// Returns the call as persisted afterwards.
    pub async fn retry_now(
        &self,
        team_id: TeamId,
        call_id: WebhookCallId,
    ) -> Result<WebhookCall, DeliveryServiceError> {
        let call = self
            .calls
            .find_by_id(call_id)
            .await?
            .filter(|c| c.team_id == team_id)
            .ok_or(DeliveryServiceError::WebhookCallNotFound)?;
        if !WebhookCallStatus::MANUAL_RETRY_FROM.contains(&call.status) {
            return Err(DeliveryServiceError::CallNotRetryable(call.status.as_str()));
        }
        let subscription = self
            .subscriptions
            .find(team_id, call.subscription_id)
            .await?
            .ok_or(DeliveryServiceError::SubscriptionNotFound)?;
        if !subscription.enabled {
            return Err(DeliveryServiceError::WebhookDisabled);
        }

        tracing::info!(team_id = %team_id, call_id = %call_id, "manual webhook retry");
        if self
            .attempt(&call, &subscription, &WebhookCallStatus::MANUAL_RETRY_FROM)
            .await?
            == DeliveryOutcome::Skipped
        {
            return Err(DeliveryServiceError::CallNotRetryable(
                WebhookCallStatus::InProgress.as_str(),
            ));
        }

        self.calls
            .find_by_id(call_id)
            .await?
            .ok_or(DeliveryServiceError::WebhookCallNotFound)
    }

    async fn discard(
        &self,
        call: &WebhookCall,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome, DeliveryServiceError> {
        if !self.calls.discard(call.id, call.attempt, reason, now).await? {
            return Ok(DeliveryOutcome::Skipped);
        }
        tracing::info!(call_id = %call.id, attempt = call.attempt, reason, "webhook call discarded");
        Ok(DeliveryOutcome::Discarded)
    }

    async fn attempt(
        &self,
        call: &WebhookCall,
        subscription: &WebhookSubscription,
        from: &[WebhookCallStatus],
    ) -> Result<DeliveryOutcome, DeliveryServiceError> {
        let started_at = Utc::now();
        if !self
            .calls
            .claim_attempt(call.id, call.attempt, from, started_at)
            .await?
        {
            tracing::debug!(call_id = %call.id, attempt = call.attempt, "webhook call claimed elsewhere");
            return Ok(DeliveryOutcome::Skipped);
        }
        let attempt = call.attempt + 1;

        let request = build_request(call, subscription, attempt, Utc::now().timestamp_millis())?;
        let response = self.transport.send(&request).await;
        let finished_at = Utc::now();
        let result = self
            .retry
            .outcome(attempt, call.max_attempts, &response, finished_at);

        if !self.calls.record_attempt(call.id, attempt, &result).await? {
            tracing::warn!(
                call_id = %call.id,
                attempt,
                "webhook attempt outcome dropped, call changed while in flight"
            );
            return Ok(DeliveryOutcome::Skipped);
        }

        match result.status {
            WebhookCallStatus::Delivered => {
                tracing::info!(
                    call_id = %call.id,
                    attempt,
                    status = ?response.status,
                    elapsed_ms = response.elapsed_ms,
                    "webhook delivered"
                );
                Ok(DeliveryOutcome::Delivered)
            }
            WebhookCallStatus::Failed => {
                let next_attempt_at = result.next_attempt_at.unwrap_or(finished_at);
                tracing::warn!(
                    call_id = %call.id,
                    attempt,
                    status = ?response.status,
                    error = ?response.error,
                    %next_attempt_at,
                    "webhook attempt failed"
                );
                self.schedule_next(call.id, attempt + 1, next_attempt_at, finished_at)
                    .await;
                Ok(DeliveryOutcome::Failed { next_attempt_at })
            }
            _ => {
                tracing::warn!(
                    call_id = %call.id,
                    attempt,
                    status = ?response.status,
                    error = ?response.error,
                    "webhook attempts exhausted"
                );
                Ok(DeliveryOutcome::Discarded)
            }
        }
    }

    async fn schedule_next(
        &self,
        call_id: WebhookCallId,
        attempt: u32,
        run_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let options = EnqueueOptions {
            delay: (run_at - now).to_std().ok(),
            max_attempts: None,
        };
        let payload = DeliveryJobPayload { call_id }.to_value();
        if let Err(e) = self
            .jobs
            .enqueue(
                WEBHOOK_DELIVERY_QUEUE,
                &delivery_job_key(call_id, attempt),
                payload,
                options,
            )
            .await
        {
            tracing::warn!(
                error = ?e,
                call_id = %call_id,
                attempt,
                "failed to enqueue webhook retry, leaving it to recovery"
            );
        }
    }
}

/// Signed request for one attempt. The timestamp is fresh per attempt; the
/// event id and data never change.
pub fn build_request(
    call: &WebhookCall,
    subscription: &WebhookSubscription,
    attempt: u32,
    timestamp_ms: i64,
) -> Result<DeliveryRequest, DeliveryServiceError> {
    let event = WebhookEvent {
        id: call.event_id.to_string(),
        event_type: call.event_type.as_str().to_owned(),
        version: WEBHOOK_PROTOCOL_VERSION.to_owned(),
        created_at: format_rfc3339_ms(&call.created_at),
        team_id: call.team_id.0,
        data: call.payload.clone(),
        attempt,
    };
    let body = serde_json::to_vec(&event).context("serialize webhook event")?;
    let signed = SignedHeaders::new(
        &subscription.secret,
        timestamp_ms,
        &body,
        call.event_type.as_str(),
        call.id.to_string(),
    );
    let headers = signed
        .pairs()
        .into_iter()
        .map(|(name, value)| (name, value.to_owned()))
        .collect();
    Ok(DeliveryRequest {
        url: subscription.url.clone(),
        body,
        headers,
    })
}
