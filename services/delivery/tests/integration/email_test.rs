use std::time::Duration;

use courier_delivery::domain::types::{OutboundEmail, WEBHOOK_DELIVERY_QUEUE, WebhookCallStatus};
use courier_delivery::error::DeliveryServiceError;
use courier_delivery::usecase::email::SendEmailUseCase;
use courier_delivery::usecase::idempotency::IdempotencyService;
use courier_delivery::usecase::rate_limit::RateLimiter;
use courier_domain::event::WebhookEventType;
use courier_domain::id::TeamId;

use crate::helpers::{
    MockIdempotencyRepo, MockJobRepo, MockLockStore, MockMailProvider, MockSubscriptionRepo,
    MockWebhookCallRepo, emitter, test_subscription,
};

const TEAM: TeamId = TeamId(42);

type TestSendEmail = SendEmailUseCase<
    MockLockStore,
    MockIdempotencyRepo,
    MockMailProvider,
    MockSubscriptionRepo,
    MockWebhookCallRepo,
    MockJobRepo,
>;

struct Fixture {
    locks: MockLockStore,
    provider: MockMailProvider,
    subscriptions: MockSubscriptionRepo,
    calls: MockWebhookCallRepo,
    jobs: MockJobRepo,
}

impl Fixture {
    fn new(provider: MockMailProvider) -> Self {
        Self {
            locks: MockLockStore::new(),
            provider,
            subscriptions: MockSubscriptionRepo::default(),
            calls: MockWebhookCallRepo::new(),
            jobs: MockJobRepo::new(),
        }
    }

    fn use_case(&self, rate_limit: u64) -> TestSendEmail {
        SendEmailUseCase {
            rate_limiter: RateLimiter {
                store: self.locks.clone(),
                scope: "emails",
                limit: rate_limit,
                window: Duration::from_secs(3600),
            },
            idempotency: IdempotencyService {
                locks: self.locks.clone(),
                records: MockIdempotencyRepo::new(),
                lock_ttl: Duration::from_secs(30),
                record_ttl: Duration::from_secs(24 * 3600),
            },
            provider: self.provider.clone(),
            emitter: emitter(&self.subscriptions, &self.calls, &self.jobs, 6),
        }
    }
}

fn email() -> OutboundEmail {
    OutboundEmail {
        from: "team@courier.dev".to_owned(),
        to: vec!["a@b.com".to_owned()],
        subject: "hi".to_owned(),
        html: None,
        text: Some("hello".to_owned()),
        reply_to: vec![],
        domain_id: None,
    }
}

#[tokio::test]
async fn should_not_send_twice_for_parallel_requests_with_same_key() {
    let fixture = Fixture::new(MockMailProvider::with_latency(Duration::from_millis(50)));
    let use_case = fixture.use_case(100);

    let (first, second) = tokio::join!(
        use_case.execute(TEAM, Some("req-42"), email()),
        use_case.execute(TEAM, Some("req-42"), email()),
    );

    let first = first.unwrap();
    assert!(
        matches!(second, Err(DeliveryServiceError::IdempotencyRequestInProgress)),
        "expected IdempotencyRequestInProgress, got {second:?}"
    );
    assert_eq!(fixture.provider.sent(), 1);

    let later = use_case.execute(TEAM, Some("req-42"), email()).await.unwrap();
    assert_eq!(later, first);
    assert_eq!(fixture.provider.sent(), 1);
}

#[tokio::test]
async fn should_reject_same_key_with_different_email() {
    let fixture = Fixture::new(MockMailProvider::default());
    let use_case = fixture.use_case(100);

    use_case.execute(TEAM, Some("req-43"), email()).await.unwrap();
    let mut changed = email();
    changed.subject = "hello again".to_owned();
    let result = use_case.execute(TEAM, Some("req-43"), changed).await;

    assert!(
        matches!(result, Err(DeliveryServiceError::IdempotencyKeyReused)),
        "expected IdempotencyKeyReused, got {result:?}"
    );
    assert_eq!(fixture.provider.sent(), 1);
}

#[tokio::test]
async fn should_rate_limit_before_sending() {
    let fixture = Fixture::new(MockMailProvider::default());
    let use_case = fixture.use_case(2);

    use_case.execute(TEAM, None, email()).await.unwrap();
    use_case.execute(TEAM, None, email()).await.unwrap();
    let result = use_case.execute(TEAM, None, email()).await;

    assert!(
        matches!(result, Err(DeliveryServiceError::RateLimited)),
        "expected RateLimited, got {result:?}"
    );
    assert_eq!(fixture.provider.sent(), 2);
}

#[tokio::test]
async fn should_reject_email_without_body() {
    let fixture = Fixture::new(MockMailProvider::default());
    let use_case = fixture.use_case(100);
    let mut bodiless = email();
    bodiless.text = None;

    let result = use_case.execute(TEAM, Some("req-44"), bodiless).await;

    assert!(
        matches!(result, Err(DeliveryServiceError::InvalidRequest(_))),
        "expected InvalidRequest, got {result:?}"
    );
    assert_eq!(fixture.provider.sent(), 0);
}

#[tokio::test]
async fn should_emit_sent_event_to_subscribers() {
    let fixture = Fixture::new(MockMailProvider::default());
    fixture
        .subscriptions
        .subscriptions
        .lock()
        .unwrap()
        .push(test_subscription(TEAM, "https://hooks.example.com/a"));
    let use_case = fixture.use_case(100);

    let sent = use_case.execute(TEAM, Some("req-45"), email()).await.unwrap();

    let calls = fixture.calls.all();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].event_type, WebhookEventType::EmailSent);
    assert_eq!(calls[0].status, WebhookCallStatus::Pending);
    assert_eq!(calls[0].payload["emailId"], sent.id.as_str());
    assert_eq!(calls[0].payload["providerMessageId"], sent.provider_message_id.as_str());
    assert_eq!(fixture.jobs.in_queue(WEBHOOK_DELIVERY_QUEUE).len(), 1);

    // A replay must not emit the event again.
    use_case.execute(TEAM, Some("req-45"), email()).await.unwrap();
    assert_eq!(fixture.calls.all().len(), 1);
}
