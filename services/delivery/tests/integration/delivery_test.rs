use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::Utc;
use serde_json::json;

use courier_delivery::domain::types::{DeliveryRequest, WEBHOOK_DELIVERY_QUEUE, WebhookCallStatus};
use courier_delivery::error::DeliveryServiceError;
use courier_delivery::usecase::webhook_delivery::{DeliveryOutcome, delivery_job_key};
use courier_delivery::usecase::webhook_recovery::{
    ATTEMPT_INTERRUPTED, WebhookRecoveryUseCase, recovery_job_key,
};
use courier_domain::event::WebhookEventType;
use courier_domain::id::{TeamId, WebhookCallId};
use courier_webhooks::{VerifyOptions, Webhooks};

use crate::helpers::{
    MockJobRepo, MockSubscriptionRepo, MockTransport, MockWebhookCallRepo, emitter,
    test_subscription, tracker,
};

const TEAM: TeamId = TeamId(5);

struct Fixture {
    subscriptions: MockSubscriptionRepo,
    calls: MockWebhookCallRepo,
    jobs: MockJobRepo,
}

impl Fixture {
    fn new() -> Self {
        Self {
            subscriptions: MockSubscriptionRepo::new(vec![test_subscription(
                TEAM,
                "https://hooks.example.com/courier",
            )]),
            calls: MockWebhookCallRepo::new(),
            jobs: MockJobRepo::new(),
        }
    }

    async fn emit(&self, max_attempts: u32) -> WebhookCallId {
        let emitted = emitter(&self.subscriptions, &self.calls, &self.jobs, max_attempts)
            .emit(
                TEAM,
                WebhookEventType::EmailDelivered,
                None,
                json!({ "emailId": "em_1" }),
            )
            .await
            .unwrap();
        assert_eq!(emitted.call_ids.len(), 1);
        emitted.call_ids[0]
    }

    /// Pretend the backoff has elapsed.
    fn make_due(&self, id: WebhookCallId) {
        self.calls.update(id, |c| {
            c.next_attempt_at = Some(Utc::now() - chrono::Duration::seconds(1));
        });
    }

    fn delivery_job_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .jobs
            .in_queue(WEBHOOK_DELIVERY_QUEUE)
            .into_iter()
            .map(|j| j.job_key)
            .collect();
        keys.sort();
        keys
    }
}

fn header_map(request: &DeliveryRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        headers.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    headers
}

// ── Emit ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_create_calls_only_for_matching_subscriptions() {
    let fixture = Fixture::new();
    let mut bounced_only = test_subscription(TEAM, "https://hooks.example.com/bounces");
    bounced_only.event_types = vec![WebhookEventType::EmailBounced];
    let mut disabled = test_subscription(TEAM, "https://hooks.example.com/off");
    disabled.enabled = false;
    let other_team = test_subscription(TeamId(99), "https://hooks.example.com/other");
    fixture
        .subscriptions
        .subscriptions
        .lock()
        .unwrap()
        .extend([bounced_only, disabled, other_team]);

    let id = fixture.emit(6).await;

    let calls = fixture.calls.all();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, id);
    assert_eq!(calls[0].status, WebhookCallStatus::Pending);
    assert_eq!(calls[0].attempt, 0);
    assert_eq!(calls[0].max_attempts, 6);
    assert_eq!(fixture.delivery_job_keys(), vec![delivery_job_key(id, 1)]);
}

#[tokio::test]
async fn should_emit_nothing_without_subscribers() {
    let fixture = Fixture {
        subscriptions: MockSubscriptionRepo::default(),
        calls: MockWebhookCallRepo::new(),
        jobs: MockJobRepo::new(),
    };

    let emitted = emitter(&fixture.subscriptions, &fixture.calls, &fixture.jobs, 6)
        .emit(TEAM, WebhookEventType::EmailSent, None, json!({}))
        .await
        .unwrap();

    assert!(emitted.call_ids.is_empty());
    assert!(fixture.jobs.all().is_empty());
}

// ── Automatic delivery ───────────────────────────────────────────────────────

#[tokio::test]
async fn should_deliver_and_record_response() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    let tracker = tracker(
        &fixture.subscriptions,
        &fixture.calls,
        &fixture.jobs,
        MockTransport::succeeding(),
    );

    let outcome = tracker.deliver(id).await.unwrap();

    assert_eq!(outcome, DeliveryOutcome::Delivered);
    let call = fixture.calls.get(id);
    assert_eq!(call.status, WebhookCallStatus::Delivered);
    assert_eq!(call.attempt, 1);
    assert_eq!(call.response_status, Some(200));
    assert_eq!(call.response_body.as_deref(), Some("ok"));
    assert!(call.last_attempt_at.is_some());
    assert_eq!(call.next_attempt_at, None);

    // A second job for the same call finds nothing to do.
    assert_eq!(tracker.deliver(id).await.unwrap(), DeliveryOutcome::Skipped);
}

#[tokio::test]
async fn should_discard_after_exhausting_attempts() {
    let fixture = Fixture::new();
    let id = fixture.emit(3).await;
    let transport = MockTransport::always(500);
    let tracker = tracker(&fixture.subscriptions, &fixture.calls, &fixture.jobs, transport.clone());

    for attempt in 1..=2 {
        let outcome = tracker.deliver(id).await.unwrap();
        assert!(
            matches!(outcome, DeliveryOutcome::Failed { .. }),
            "attempt {attempt}: expected Failed, got {outcome:?}"
        );
        let call = fixture.calls.get(id);
        assert_eq!(call.status, WebhookCallStatus::Failed);
        assert_eq!(call.attempt, attempt);
        assert_eq!(call.response_status, Some(500));
        fixture.make_due(id);
    }

    assert_eq!(tracker.deliver(id).await.unwrap(), DeliveryOutcome::Discarded);

    let call = fixture.calls.get(id);
    assert_eq!(call.status, WebhookCallStatus::Discarded);
    assert_eq!(call.attempt, 3);
    assert_eq!(call.next_attempt_at, None);
    assert_eq!(transport.requests().len(), 3);
    let mut expected: Vec<String> = (1..=3).map(|n| delivery_job_key(id, n)).collect();
    expected.sort();
    assert_eq!(fixture.delivery_job_keys(), expected);

    assert_eq!(tracker.deliver(id).await.unwrap(), DeliveryOutcome::Skipped);
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn should_schedule_retry_with_backoff() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    let tracker = tracker(
        &fixture.subscriptions,
        &fixture.calls,
        &fixture.jobs,
        MockTransport::always(503),
    );
    let before = Utc::now();

    let outcome = tracker.deliver(id).await.unwrap();

    let DeliveryOutcome::Failed { next_attempt_at } = outcome else {
        panic!("expected Failed, got {outcome:?}");
    };
    let wait = next_attempt_at - before;
    assert!(wait >= chrono::Duration::seconds(30), "retry too early: {wait}");
    assert!(wait <= chrono::Duration::seconds(34), "retry too late: {wait}");

    let retry = fixture
        .jobs
        .in_queue(WEBHOOK_DELIVERY_QUEUE)
        .into_iter()
        .find(|j| j.job_key == delivery_job_key(id, 2))
        .expect("retry job queued");
    assert!(retry.run_at > Utc::now() + chrono::Duration::seconds(25));
}

#[tokio::test]
async fn should_not_attempt_before_next_attempt_at() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    let transport = MockTransport::always(500);
    let tracker = tracker(&fixture.subscriptions, &fixture.calls, &fixture.jobs, transport.clone());

    tracker.deliver(id).await.unwrap();
    let outcome = tracker.deliver(id).await.unwrap();

    assert!(
        matches!(outcome, DeliveryOutcome::NotDue { .. }),
        "expected NotDue, got {outcome:?}"
    );
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(fixture.calls.get(id).attempt, 1);
}

#[tokio::test]
async fn should_skip_call_claimed_by_another_worker() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    fixture.calls.update(id, |c| {
        c.status = WebhookCallStatus::InProgress;
        c.attempt = 1;
    });
    let transport = MockTransport::succeeding();
    let tracker = tracker(&fixture.subscriptions, &fixture.calls, &fixture.jobs, transport.clone());

    assert_eq!(tracker.deliver(id).await.unwrap(), DeliveryOutcome::Skipped);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn should_discard_when_subscription_disabled() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    for sub in fixture.subscriptions.subscriptions.lock().unwrap().iter_mut() {
        sub.enabled = false;
    }
    let transport = MockTransport::succeeding();
    let tracker = tracker(&fixture.subscriptions, &fixture.calls, &fixture.jobs, transport.clone());

    assert_eq!(tracker.deliver(id).await.unwrap(), DeliveryOutcome::Discarded);

    let call = fixture.calls.get(id);
    assert_eq!(call.status, WebhookCallStatus::Discarded);
    assert_eq!(call.attempt, 0);
    assert_eq!(call.last_error.as_deref(), Some("webhook disabled"));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn should_discard_when_subscription_deleted() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    fixture.subscriptions.subscriptions.lock().unwrap().clear();
    let tracker = tracker(
        &fixture.subscriptions,
        &fixture.calls,
        &fixture.jobs,
        MockTransport::succeeding(),
    );

    assert_eq!(tracker.deliver(id).await.unwrap(), DeliveryOutcome::Discarded);
    assert_eq!(
        fixture.calls.get(id).last_error.as_deref(),
        Some("webhook deleted")
    );
}

// ── Signing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_sign_every_attempt_for_the_receiver() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    let secret = fixture.subscriptions.subscriptions.lock().unwrap()[0].secret.clone();
    let transport = MockTransport::default();
    transport.push_many(500, 1);
    let tracker = tracker(&fixture.subscriptions, &fixture.calls, &fixture.jobs, transport.clone());

    tracker.deliver(id).await.unwrap();
    fixture.make_due(id);
    assert_eq!(tracker.deliver(id).await.unwrap(), DeliveryOutcome::Delivered);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let webhooks = Webhooks::new(secret);
    let call = fixture.calls.get(id);
    for (i, request) in requests.iter().enumerate() {
        assert_eq!(request.url, "https://hooks.example.com/courier");
        let event = webhooks
            .construct_event(&request.body, &header_map(request), VerifyOptions::default())
            .unwrap();
        assert_eq!(event.id, call.event_id.to_string());
        assert_eq!(event.event_type, "email.delivered");
        assert_eq!(event.team_id, TEAM.0);
        assert_eq!(event.attempt, i as u32 + 1);
        assert_eq!(event.data, json!({ "emailId": "em_1" }));
    }

    let wrong = Webhooks::new("whsec_not-the-secret");
    assert!(!wrong.verify(&requests[0].body, &header_map(&requests[0]), VerifyOptions::default()));
}

// ── Manual retry ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_retry_discarded_call_manually() {
    let fixture = Fixture::new();
    let id = fixture.emit(2).await;
    let transport = MockTransport::default();
    transport.push_many(500, 2);
    let tracker = tracker(&fixture.subscriptions, &fixture.calls, &fixture.jobs, transport.clone());

    tracker.deliver(id).await.unwrap();
    fixture.make_due(id);
    assert_eq!(tracker.deliver(id).await.unwrap(), DeliveryOutcome::Discarded);

    let call = tracker.retry_now(TEAM, id).await.unwrap();

    assert_eq!(call.status, WebhookCallStatus::Delivered);
    assert_eq!(call.attempt, 3);
    assert_eq!(call.response_status, Some(200));
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn should_retry_failed_call_before_its_backoff() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    let transport = MockTransport::default();
    transport.push_many(500, 1);
    let tracker = tracker(&fixture.subscriptions, &fixture.calls, &fixture.jobs, transport);

    tracker.deliver(id).await.unwrap();
    assert_eq!(fixture.calls.get(id).status, WebhookCallStatus::Failed);

    let call = tracker.retry_now(TEAM, id).await.unwrap();

    assert_eq!(call.status, WebhookCallStatus::Delivered);
    assert_eq!(call.attempt, 2);
    // The queued automatic retry now finds nothing to do.
    assert_eq!(tracker.deliver(id).await.unwrap(), DeliveryOutcome::Skipped);
}

#[tokio::test]
async fn should_refuse_manual_retry_of_delivered_call() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    let tracker = tracker(
        &fixture.subscriptions,
        &fixture.calls,
        &fixture.jobs,
        MockTransport::succeeding(),
    );
    tracker.deliver(id).await.unwrap();

    let result = tracker.retry_now(TEAM, id).await;

    assert!(
        matches!(result, Err(DeliveryServiceError::CallNotRetryable("DELIVERED"))),
        "expected CallNotRetryable, got {result:?}"
    );
}

#[tokio::test]
async fn should_refuse_manual_retry_while_subscription_disabled() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    let transport = MockTransport::default();
    transport.push_many(500, 1);
    let tracker = tracker(&fixture.subscriptions, &fixture.calls, &fixture.jobs, transport.clone());
    tracker.deliver(id).await.unwrap();
    for sub in fixture.subscriptions.subscriptions.lock().unwrap().iter_mut() {
        sub.enabled = false;
    }

    let result = tracker.retry_now(TEAM, id).await;

    assert!(
        matches!(result, Err(DeliveryServiceError::WebhookDisabled)),
        "expected WebhookDisabled, got {result:?}"
    );
    assert_eq!(transport.requests().len(), 1);
    let call = fixture.calls.get(id);
    assert_eq!(call.status, WebhookCallStatus::Failed);
    assert_eq!(call.attempt, 1);
}

#[tokio::test]
async fn should_hide_calls_of_other_teams() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    fixture.calls.update(id, |c| c.status = WebhookCallStatus::Discarded);
    let tracker = tracker(
        &fixture.subscriptions,
        &fixture.calls,
        &fixture.jobs,
        MockTransport::succeeding(),
    );

    let result = tracker.retry_now(TeamId(6), id).await;

    assert!(
        matches!(result, Err(DeliveryServiceError::WebhookCallNotFound)),
        "expected WebhookCallNotFound, got {result:?}"
    );
}

// ── Recovery ─────────────────────────────────────────────────────────────────

fn recovery(fixture: &Fixture) -> WebhookRecoveryUseCase<MockWebhookCallRepo, MockJobRepo> {
    WebhookRecoveryUseCase {
        calls: fixture.calls.clone(),
        jobs: courier_delivery::usecase::jobs::JobQueue::new(fixture.jobs.clone()),
        stall_after: Duration::from_secs(150),
        pending_grace: Duration::from_secs(60),
        batch_size: 100,
    }
}

#[tokio::test]
async fn should_fail_stalled_attempts_and_requeue_them() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    let long_ago = Utc::now() - chrono::Duration::minutes(10);
    fixture.calls.update(id, |c| {
        c.status = WebhookCallStatus::InProgress;
        c.attempt = 1;
        c.last_attempt_at = Some(long_ago);
        c.next_attempt_at = None;
    });

    let report = recovery(&fixture).execute(Utc::now()).await.unwrap();

    assert_eq!(report.stalled, 1);
    assert_eq!(report.failed_requeued, 1);
    let call = fixture.calls.get(id);
    assert_eq!(call.status, WebhookCallStatus::Failed);
    assert_eq!(call.last_error.as_deref(), Some(ATTEMPT_INTERRUPTED));
    assert!(fixture.delivery_job_keys().contains(&recovery_job_key(&call)));

    let tracker = tracker(
        &fixture.subscriptions,
        &fixture.calls,
        &fixture.jobs,
        MockTransport::succeeding(),
    );
    assert_eq!(tracker.deliver(id).await.unwrap(), DeliveryOutcome::Delivered);
    assert_eq!(fixture.calls.get(id).attempt, 2);
}

#[tokio::test]
async fn should_discard_stalled_call_without_attempts_left() {
    let fixture = Fixture::new();
    let id = fixture.emit(2).await;
    fixture.calls.update(id, |c| {
        c.status = WebhookCallStatus::InProgress;
        c.attempt = 2;
        c.last_attempt_at = Some(Utc::now() - chrono::Duration::minutes(10));
    });

    let report = recovery(&fixture).execute(Utc::now()).await.unwrap();

    assert_eq!(report.stalled, 1);
    assert_eq!(report.failed_requeued, 0);
    assert_eq!(fixture.calls.get(id).status, WebhookCallStatus::Discarded);
}

#[tokio::test]
async fn should_requeue_stale_pending_calls_once() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    fixture.calls.update(id, |c| {
        c.created_at = Utc::now() - chrono::Duration::minutes(5);
    });
    let sweep = recovery(&fixture);

    let first = sweep.execute(Utc::now()).await.unwrap();
    let second = sweep.execute(Utc::now()).await.unwrap();

    assert_eq!(first.pending_requeued, 1);
    assert_eq!(second.pending_requeued, 0);
    assert_eq!(fixture.jobs.in_queue(WEBHOOK_DELIVERY_QUEUE).len(), 2);
}

#[tokio::test]
async fn should_leave_in_flight_attempts_alone() {
    let fixture = Fixture::new();
    let id = fixture.emit(6).await;
    fixture.calls.update(id, |c| {
        c.status = WebhookCallStatus::InProgress;
        c.attempt = 1;
        c.last_attempt_at = Some(Utc::now());
    });

    let report = recovery(&fixture).execute(Utc::now()).await.unwrap();

    assert_eq!(report.stalled, 0);
    assert_eq!(fixture.calls.get(id).status, WebhookCallStatus::InProgress);
}
