use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use courier_delivery::domain::repository::{
    IdempotencyRepository, JobRepository, LockStore, MailProvider, SubscriptionRepository,
    WebhookCallRepository, WebhookTransport,
};
use courier_delivery::domain::types::{
    AttemptResult, DeliveryRequest, DeliveryResponse, Enqueued, IdempotencyRecord, Job,
    JobSchedule, JobStatus, NewJob, OutboundEmail, WebhookCall, WebhookCallStatus,
    WebhookSubscription,
};
use courier_delivery::error::DeliveryServiceError;
use courier_delivery::usecase::jobs::JobQueue;
use courier_delivery::usecase::webhook_delivery::{RetryPolicy, WebhookDeliveryTracker};
use courier_delivery::usecase::webhook_emit::WebhookEmitter;
use courier_domain::id::{JobId, SubscriptionId, TeamId, WebhookCallId};
use courier_domain::pagination::PageRequest;

// ── MockLockStore ────────────────────────────────────────────────────────────

/// In-memory stand-in for Redis. Entries expire on the tokio clock, so paused
/// tests can move past a TTL with `tokio::time::advance`.
#[derive(Clone, Default)]
pub struct MockLockStore {
    pub entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MockLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(v, _)| v.clone())
    }

    /// Drop every key with the given prefix, as if its TTL had passed.
    pub fn expire_prefix(&self, prefix: &str) {
        self.entries
            .lock()
            .unwrap()
            .retain(|k, _| !k.starts_with(prefix));
    }
}

impl LockStore for MockLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, DeliveryServiceError> {
        if self.value(key).is_some() {
            return Ok(false);
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), (value.to_owned(), Instant::now() + ttl));
        Ok(true)
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<bool, DeliveryServiceError> {
        if self.value(key).as_deref() != Some(expected) {
            return Ok(false);
        }
        self.entries.lock().unwrap().remove(key);
        Ok(true)
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<u64, DeliveryServiceError> {
        let next = self
            .value(key)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        let mut entries = self.entries.lock().unwrap();
        let expires = match entries.get(key) {
            Some((_, expires)) if next > 1 => *expires,
            _ => Instant::now() + ttl,
        };
        entries.insert(key.to_owned(), (next.to_string(), expires));
        Ok(next)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, DeliveryServiceError> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DeliveryServiceError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), (value.to_owned(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DeliveryServiceError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

// ── MockIdempotencyRepo ──────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockIdempotencyRepo {
    pub records: Arc<Mutex<Vec<IdempotencyRecord>>>,
    failing_inserts: Arc<AtomicUsize>,
}

impl MockIdempotencyRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` inserts fail as if the database were unreachable.
    pub fn fail_next_inserts(&self, n: usize) {
        self.failing_inserts.store(n, Ordering::SeqCst);
    }
}

impl IdempotencyRepository for MockIdempotencyRepo {
    async fn find_active(
        &self,
        team_id: TeamId,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>, DeliveryServiceError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.team_id == team_id && r.key == key && !r.is_expired(now))
            .cloned())
    }

    async fn insert_if_absent(&self, record: &IdempotencyRecord) -> Result<bool, DeliveryServiceError> {
        let failing = self
            .failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(DeliveryServiceError::Internal(anyhow::anyhow!("connection reset")));
        }
        let mut records = self.records.lock().unwrap();
        records.retain(|r| {
            !(r.team_id == record.team_id && r.key == record.key && r.is_expired(record.created_at))
        });
        if records
            .iter()
            .any(|r| r.team_id == record.team_id && r.key == record.key)
        {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, DeliveryServiceError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| !r.is_expired(now));
        Ok((before - records.len()) as u64)
    }
}

// ── MockSubscriptionRepo ─────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockSubscriptionRepo {
    pub subscriptions: Arc<Mutex<Vec<WebhookSubscription>>>,
}

impl MockSubscriptionRepo {
    pub fn new(subscriptions: Vec<WebhookSubscription>) -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(subscriptions)),
        }
    }
}

impl SubscriptionRepository for MockSubscriptionRepo {
    async fn create(&self, subscription: &WebhookSubscription) -> Result<(), DeliveryServiceError> {
        self.subscriptions.lock().unwrap().push(subscription.clone());
        Ok(())
    }

    async fn find(
        &self,
        team_id: TeamId,
        id: SubscriptionId,
    ) -> Result<Option<WebhookSubscription>, DeliveryServiceError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.team_id == team_id && s.id == id)
            .cloned())
    }

    async fn find_by_id(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<WebhookSubscription>, DeliveryServiceError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn list_by_team(
        &self,
        team_id: TeamId,
        page: PageRequest,
    ) -> Result<Vec<WebhookSubscription>, DeliveryServiceError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.team_id == team_id)
            .skip(page.offset() as usize)
            .take(page.clamped().limit as usize)
            .cloned()
            .collect())
    }

    async fn list_enabled_by_team(
        &self,
        team_id: TeamId,
    ) -> Result<Vec<WebhookSubscription>, DeliveryServiceError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.team_id == team_id && s.enabled)
            .cloned()
            .collect())
    }

    async fn update(&self, subscription: &WebhookSubscription) -> Result<bool, DeliveryServiceError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        match subscriptions.iter_mut().find(|s| s.id == subscription.id) {
            Some(existing) => {
                *existing = subscription.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, team_id: TeamId, id: SubscriptionId) -> Result<bool, DeliveryServiceError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let before = subscriptions.len();
        subscriptions.retain(|s| !(s.team_id == team_id && s.id == id));
        Ok(subscriptions.len() < before)
    }
}

// ── MockWebhookCallRepo ──────────────────────────────────────────────────────

/// Applies the same conditional updates as the SQL repository.
#[derive(Clone, Default)]
pub struct MockWebhookCallRepo {
    pub calls: Arc<Mutex<Vec<WebhookCall>>>,
}

impl MockWebhookCallRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: WebhookCallId) -> WebhookCall {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .expect("webhook call exists")
    }

    pub fn all(&self) -> Vec<WebhookCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn update(&self, id: WebhookCallId, f: impl FnOnce(&mut WebhookCall)) {
        let mut calls = self.calls.lock().unwrap();
        if let Some(call) = calls.iter_mut().find(|c| c.id == id) {
            f(call);
        }
    }
}

impl WebhookCallRepository for MockWebhookCallRepo {
    async fn create_many(&self, calls: &[WebhookCall]) -> Result<(), DeliveryServiceError> {
        self.calls.lock().unwrap().extend_from_slice(calls);
        Ok(())
    }

    async fn find_by_id(&self, id: WebhookCallId) -> Result<Option<WebhookCall>, DeliveryServiceError> {
        Ok(self.calls.lock().unwrap().iter().find(|c| c.id == id).cloned())
    }

    async fn list_by_subscription(
        &self,
        subscription_id: SubscriptionId,
        page: PageRequest,
    ) -> Result<Vec<WebhookCall>, DeliveryServiceError> {
        let mut calls: Vec<WebhookCall> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.subscription_id == subscription_id)
            .cloned()
            .collect();
        calls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(calls
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.clamped().limit as usize)
            .collect())
    }

    async fn claim_attempt(
        &self,
        id: WebhookCallId,
        expected_attempt: u32,
        from: &[WebhookCallStatus],
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        let mut calls = self.calls.lock().unwrap();
        let Some(call) = calls
            .iter_mut()
            .find(|c| c.id == id && c.attempt == expected_attempt && from.contains(&c.status))
        else {
            return Ok(false);
        };
        transition(call, WebhookCallStatus::InProgress);
        call.attempt = expected_attempt + 1;
        call.last_attempt_at = Some(now);
        call.next_attempt_at = None;
        call.updated_at = now;
        Ok(true)
    }

    async fn record_attempt(
        &self,
        id: WebhookCallId,
        attempt: u32,
        result: &AttemptResult,
    ) -> Result<bool, DeliveryServiceError> {
        let mut calls = self.calls.lock().unwrap();
        let Some(call) = calls.iter_mut().find(|c| {
            c.id == id && c.attempt == attempt && c.status == WebhookCallStatus::InProgress
        }) else {
            return Ok(false);
        };
        transition(call, result.status);
        call.next_attempt_at = result.next_attempt_at;
        call.response_status = result.response_status;
        call.response_body = result.response_body.clone();
        call.response_time_ms = result.response_time_ms;
        call.last_error = result.last_error.clone();
        call.updated_at = result.finished_at;
        Ok(true)
    }

    async fn discard(
        &self,
        id: WebhookCallId,
        expected_attempt: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        let mut calls = self.calls.lock().unwrap();
        let Some(call) = calls.iter_mut().find(|c| {
            c.id == id
                && c.attempt == expected_attempt
                && WebhookCallStatus::OPEN.contains(&c.status)
        }) else {
            return Ok(false);
        };
        discard_call(call, reason, now);
        Ok(true)
    }

    async fn discard_open_for_subscription(
        &self,
        subscription_id: SubscriptionId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError> {
        let mut count = 0;
        for call in self.calls.lock().unwrap().iter_mut() {
            if call.subscription_id == subscription_id
                && WebhookCallStatus::OPEN.contains(&call.status)
            {
                discard_call(call, reason, now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_due_failed(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<WebhookCall>, DeliveryServiceError> {
        Ok(self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                c.status == WebhookCallStatus::Failed
                    && c.attempt < c.max_attempts
                    && c.next_attempt_at.is_some_and(|at| at <= now)
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<WebhookCall>, DeliveryServiceError> {
        Ok(self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.status == WebhookCallStatus::Pending && c.created_at < created_before)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn fail_stalled(
        &self,
        started_before: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DeliveryServiceError> {
        let mut count = 0;
        for call in self.calls.lock().unwrap().iter_mut() {
            let stalled = call.status == WebhookCallStatus::InProgress
                && call.last_attempt_at.is_some_and(|at| at < started_before);
            if !stalled {
                continue;
            }
            if call.attempt >= call.max_attempts {
                transition(call, WebhookCallStatus::Discarded);
            } else {
                transition(call, WebhookCallStatus::Failed);
                call.next_attempt_at = Some(now);
            }
            call.last_error = Some(error.to_owned());
            call.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DeliveryServiceError> {
        let mut calls = self.calls.lock().unwrap();
        let before = calls.len();
        calls.retain(|c| c.created_at >= cutoff);
        Ok((before - calls.len()) as u64)
    }
}

/// Every status write goes through the state machine's edge table, so any
/// scenario that takes an illegal edge fails loudly.
fn transition(call: &mut WebhookCall, next: WebhookCallStatus) {
    assert!(
        call.status.can_transition_to(next),
        "illegal webhook call transition {} -> {next}",
        call.status
    );
    call.status = next;
}

fn discard_call(call: &mut WebhookCall, reason: &str, now: DateTime<Utc>) {
    transition(call, WebhookCallStatus::Discarded);
    call.last_error = Some(reason.to_owned());
    call.next_attempt_at = None;
    call.updated_at = now;
}

// ── MockJobRepo ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockJobRepo {
    pub jobs: Arc<Mutex<Vec<Job>>>,
    pub schedules: Arc<Mutex<Vec<JobSchedule>>>,
}

impl MockJobRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn in_queue(&self, queue: &str) -> Vec<Job> {
        self.all().into_iter().filter(|j| j.queue == queue).collect()
    }

    pub fn get(&self, id: JobId) -> Job {
        self.all()
            .into_iter()
            .find(|j| j.id == id)
            .expect("job exists")
    }

    /// Make every pending job due now.
    pub fn make_all_due(&self) {
        let now = Utc::now();
        for job in self.jobs.lock().unwrap().iter_mut() {
            if job.status == JobStatus::Pending {
                job.run_at = now - chrono::Duration::milliseconds(1);
            }
        }
    }
}

impl JobRepository for MockJobRepo {
    async fn insert_if_absent(&self, job: &NewJob) -> Result<Enqueued, DeliveryServiceError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(existing) = jobs
            .iter()
            .find(|j| j.queue == job.queue && j.job_key == job.job_key)
        {
            return Ok(Enqueued::Duplicate(existing.id));
        }
        let id = JobId::new();
        jobs.push(Job {
            id,
            queue: job.queue.clone(),
            job_key: job.job_key.clone(),
            payload: job.payload.clone(),
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: job.max_attempts,
            run_at: job.run_at,
            locked_until: None,
            last_error: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
        });
        Ok(Enqueued::Created(id))
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, DeliveryServiceError> {
        Ok(self.jobs.lock().unwrap().iter().find(|j| j.id == id).cloned())
    }

    async fn claim_next(
        &self,
        queue: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<Job>, DeliveryServiceError> {
        let mut jobs = self.jobs.lock().unwrap();
        let next = jobs
            .iter_mut()
            .filter(|j| j.queue == queue && j.status == JobStatus::Pending && j.run_at <= now)
            .min_by_key(|j| j.run_at);
        let Some(job) = next else {
            return Ok(None);
        };
        job.status = JobStatus::Running;
        job.attempts += 1;
        job.locked_until = Some(now + chrono::Duration::from_std(lease).unwrap());
        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: JobId, now: DateTime<Utc>) -> Result<(), DeliveryServiceError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Completed;
            job.completed_at = Some(now);
            job.locked_until = None;
        }
        Ok(())
    }

    async fn retry_at(
        &self,
        id: JobId,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DeliveryServiceError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Pending;
            job.run_at = run_at;
            job.last_error = Some(error.to_owned());
            job.locked_until = None;
        }
        Ok(())
    }

    async fn fail(&self, id: JobId, now: DateTime<Utc>, error: &str) -> Result<(), DeliveryServiceError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Failed;
            job.failed_at = Some(now);
            job.last_error = Some(error.to_owned());
            job.locked_until = None;
        }
        Ok(())
    }

    async fn release_expired(&self, queue: &str, now: DateTime<Utc>) -> Result<u64, DeliveryServiceError> {
        let mut count = 0;
        for job in self.jobs.lock().unwrap().iter_mut() {
            let expired = job.queue == queue
                && job.status == JobStatus::Running
                && job.locked_until.is_some_and(|at| at < now);
            if !expired {
                continue;
            }
            if job.attempts >= job.max_attempts {
                job.status = JobStatus::Failed;
                job.failed_at = Some(now);
            } else {
                job.status = JobStatus::Pending;
                job.run_at = now;
            }
            job.last_error = Some("lease expired".to_owned());
            job.locked_until = None;
            count += 1;
        }
        Ok(count)
    }

    async fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DeliveryServiceError> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| {
            !(j.status == JobStatus::Completed && j.completed_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - jobs.len()) as u64)
    }

    async fn find_schedule(
        &self,
        queue: &str,
        schedule_name: &str,
    ) -> Result<Option<JobSchedule>, DeliveryServiceError> {
        Ok(self
            .schedules
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.queue == queue && s.schedule_name == schedule_name)
            .cloned())
    }

    async fn upsert_schedule(&self, schedule: &JobSchedule) -> Result<(), DeliveryServiceError> {
        let mut schedules = self.schedules.lock().unwrap();
        schedules.retain(|s| !(s.queue == schedule.queue && s.schedule_name == schedule.schedule_name));
        schedules.push(schedule.clone());
        Ok(())
    }

    async fn due_schedules(&self, now: DateTime<Utc>) -> Result<Vec<JobSchedule>, DeliveryServiceError> {
        Ok(self
            .schedules
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.next_run_at <= now)
            .cloned()
            .collect())
    }

    async fn advance_schedule(
        &self,
        queue: &str,
        schedule_name: &str,
        expected: DateTime<Utc>,
        next: DateTime<Utc>,
    ) -> Result<bool, DeliveryServiceError> {
        let mut schedules = self.schedules.lock().unwrap();
        let Some(schedule) = schedules.iter_mut().find(|s| {
            s.queue == queue && s.schedule_name == schedule_name && s.next_run_at == expected
        }) else {
            return Ok(false);
        };
        schedule.next_run_at = next;
        Ok(true)
    }
}

// ── MockTransport ────────────────────────────────────────────────────────────

/// Replays scripted responses in order, then answers 200.
#[derive(Clone, Default)]
pub struct MockTransport {
    pub script: Arc<Mutex<VecDeque<DeliveryResponse>>>,
    pub requests: Arc<Mutex<Vec<DeliveryRequest>>>,
}

impl MockTransport {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn always(status: u16) -> Self {
        let transport = Self::default();
        transport.push_many(status, 64);
        transport
    }

    pub fn push_many(&self, status: u16, times: usize) {
        let mut script = self.script.lock().unwrap();
        for _ in 0..times {
            script.push_back(response(status));
        }
    }

    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn response(status: u16) -> DeliveryResponse {
    let ok = (200..300).contains(&status);
    DeliveryResponse {
        status: Some(status),
        body: Some(if ok { "ok" } else { "nope" }.to_owned()),
        elapsed_ms: 3,
        error: (!ok).then(|| format!("HTTP {status}")),
    }
}

impl WebhookTransport for MockTransport {
    async fn send(&self, request: &DeliveryRequest) -> DeliveryResponse {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| response(200))
    }
}

// ── MockMailProvider ─────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockMailProvider {
    pub sent: Arc<AtomicUsize>,
    /// Time each send takes, to keep a request in flight.
    pub latency: Duration,
}

impl MockMailProvider {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            sent: Arc::new(AtomicUsize::new(0)),
            latency,
        }
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

impl MailProvider for MockMailProvider {
    async fn send(&self, _email: &OutboundEmail) -> Result<String, DeliveryServiceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("provider-msg-{n}"))
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub fn test_subscription(team_id: TeamId, url: &str) -> WebhookSubscription {
    let now = Utc::now();
    WebhookSubscription {
        id: SubscriptionId::new(),
        team_id,
        url: url.to_owned(),
        secret: "whsec_testsecret0123456789abcdefghij".to_owned(),
        event_types: vec![],
        domain_ids: vec![],
        enabled: true,
        description: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn no_jitter_policy() -> RetryPolicy {
    RetryPolicy {
        jitter: 0.0,
        ..RetryPolicy::default()
    }
}

pub fn emitter(
    subscriptions: &MockSubscriptionRepo,
    calls: &MockWebhookCallRepo,
    jobs: &MockJobRepo,
    max_attempts: u32,
) -> WebhookEmitter<MockSubscriptionRepo, MockWebhookCallRepo, MockJobRepo> {
    WebhookEmitter {
        subscriptions: subscriptions.clone(),
        calls: calls.clone(),
        jobs: JobQueue::new(jobs.clone()),
        max_attempts,
    }
}

pub fn tracker<T: WebhookTransport>(
    subscriptions: &MockSubscriptionRepo,
    calls: &MockWebhookCallRepo,
    jobs: &MockJobRepo,
    transport: T,
) -> WebhookDeliveryTracker<MockWebhookCallRepo, MockSubscriptionRepo, T, MockJobRepo> {
    WebhookDeliveryTracker {
        calls: calls.clone(),
        subscriptions: subscriptions.clone(),
        transport,
        jobs: JobQueue::new(jobs.clone()),
        retry: no_jitter_policy(),
    }
}
