#![allow(async_fn_in_trait)]

use std::time::Duration;

use chrono::{DateTime, Utc};

use courier_domain::id::{JobId, SubscriptionId, TeamId, WebhookCallId};
use courier_domain::pagination::PageRequest;

use crate::domain::types::{
    AttemptResult, DeliveryRequest, DeliveryResponse, Enqueued, IdempotencyRecord, Job,
    JobSchedule, NewJob, OutboundEmail, WebhookCall, WebhookCallStatus, WebhookSubscription,
};
use crate::error::DeliveryServiceError;

/// Shared low-latency key-value store with atomic conditional writes (Redis).
pub trait LockStore: Send + Sync {
    /// `SET key value NX EX ttl`. `true` when the key was written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, DeliveryServiceError>;

    /// Delete `key` only while it still holds `expected`. `true` when deleted.
    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<bool, DeliveryServiceError>;

    /// Increment a counter, starting its TTL on first increment. Returns the new value.
    async fn incr_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<u64, DeliveryServiceError>;

    async fn get(&self, key: &str) -> Result<Option<String>, DeliveryServiceError>;

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), DeliveryServiceError>;

    async fn delete(&self, key: &str) -> Result<(), DeliveryServiceError>;
}

/// Completed idempotent requests (Postgres, source of truth after completion).
pub trait IdempotencyRepository: Send + Sync {
    /// The unexpired record for `(team, key)`, if any.
    async fn find_active(
        &self,
        team_id: TeamId,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>, DeliveryServiceError>;

    /// Insert unless a record already exists for `(team, key)`. `true` when inserted.
    async fn insert_if_absent(
        &self,
        record: &IdempotencyRecord,
    ) -> Result<bool, DeliveryServiceError>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, DeliveryServiceError>;
}

pub trait SubscriptionRepository: Send + Sync {
    async fn create(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<(), DeliveryServiceError>;

    async fn find(
        &self,
        team_id: TeamId,
        id: SubscriptionId,
    ) -> Result<Option<WebhookSubscription>, DeliveryServiceError>;

    /// Lookup without tenant scoping, for background delivery.
    async fn find_by_id(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<WebhookSubscription>, DeliveryServiceError>;

    async fn list_by_team(
        &self,
        team_id: TeamId,
        page: PageRequest,
    ) -> Result<Vec<WebhookSubscription>, DeliveryServiceError>;

    async fn list_enabled_by_team(
        &self,
        team_id: TeamId,
    ) -> Result<Vec<WebhookSubscription>, DeliveryServiceError>;

    /// Returns `false` when the subscription no longer exists.
    async fn update(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<bool, DeliveryServiceError>;

    async fn delete(
        &self,
        team_id: TeamId,
        id: SubscriptionId,
    ) -> Result<bool, DeliveryServiceError>;
}

pub trait WebhookCallRepository: Send + Sync {
    async fn create_many(&self, calls: &[WebhookCall]) -> Result<(), DeliveryServiceError>;

    async fn find_by_id(
        &self,
        id: WebhookCallId,
    ) -> Result<Option<WebhookCall>, DeliveryServiceError>;

    async fn list_by_subscription(
        &self,
        subscription_id: SubscriptionId,
        page: PageRequest,
    ) -> Result<Vec<WebhookCall>, DeliveryServiceError>;

    /// Move the call to `IN_PROGRESS` at attempt `expected_attempt + 1`, but only
    /// while it is in one of `from` at `expected_attempt`. `false` means another
    /// worker got there first.
    async fn claim_attempt(
        &self,
        id: WebhookCallId,
        expected_attempt: u32,
        from: &[WebhookCallStatus],
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError>;

    /// Record the outcome of `attempt`, only while the call is still
    /// `IN_PROGRESS` at that attempt.
    async fn record_attempt(
        &self,
        id: WebhookCallId,
        attempt: u32,
        result: &AttemptResult,
    ) -> Result<bool, DeliveryServiceError>;

    /// Discard one call still in an open status at `expected_attempt`.
    async fn discard(
        &self,
        id: WebhookCallId,
        expected_attempt: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError>;

    /// Discard every open call of a subscription. Returns the affected count.
    async fn discard_open_for_subscription(
        &self,
        subscription_id: SubscriptionId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError>;

    /// `FAILED` calls whose `next_attempt_at` has passed.
    async fn list_due_failed(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<WebhookCall>, DeliveryServiceError>;

    /// `PENDING` calls created before `created_before`.
    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<WebhookCall>, DeliveryServiceError>;

    /// Fail `IN_PROGRESS` calls whose attempt started before `started_before`.
    /// Calls with no attempts left become `DISCARDED` instead.
    async fn fail_stalled(
        &self,
        started_before: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError>;

    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError>;
}

pub trait JobRepository: Send + Sync {
    /// Insert unless `(queue, job_key)` exists.
    async fn insert_if_absent(&self, job: &NewJob) -> Result<Enqueued, DeliveryServiceError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, DeliveryServiceError>;

    /// Claim the oldest due pending job of `queue`, leasing it until `now + lease`.
    async fn claim_next(
        &self,
        queue: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<Job>, DeliveryServiceError>;

    async fn complete(&self, id: JobId, now: DateTime<Utc>) -> Result<(), DeliveryServiceError>;

    /// Return a running job to `pending`, due at `run_at`.
    async fn retry_at(
        &self,
        id: JobId,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DeliveryServiceError>;

    async fn fail(
        &self,
        id: JobId,
        now: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DeliveryServiceError>;

    /// Reset running jobs of `queue` whose lease expired. Jobs with no attempts
    /// left are failed instead. Returns the affected count.
    async fn release_expired(
        &self,
        queue: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError>;

    async fn delete_completed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError>;

    async fn find_schedule(
        &self,
        queue: &str,
        schedule_name: &str,
    ) -> Result<Option<JobSchedule>, DeliveryServiceError>;

    /// Insert or update the schedule identified by `(queue, schedule_name)`.
    async fn upsert_schedule(&self, schedule: &JobSchedule) -> Result<(), DeliveryServiceError>;

    async fn due_schedules(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobSchedule>, DeliveryServiceError>;

    /// Move `next_run_at` from `expected` to `next`. `false` when another
    /// scheduler already advanced it.
    async fn advance_schedule(
        &self,
        queue: &str,
        schedule_name: &str,
        expected: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError>;
}

/// Performs one webhook HTTP attempt. Transport failures are reported in the
/// response, never as an error.
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: &DeliveryRequest) -> DeliveryResponse;
}

/// Outbound mail provider call contract.
pub trait MailProvider: Send + Sync {
    /// Returns the provider message id.
    async fn send(&self, email: &OutboundEmail) -> Result<String, DeliveryServiceError>;
}
