use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::Pool as RedisPool;
use reqwest::Client;
use sea_orm::DatabaseConnection;

use crate::config::DeliveryConfig;
use crate::infra::cache::RedisLockStore;
use crate::infra::db::{
    DbIdempotencyRepository, DbJobRepository, DbSubscriptionRepository, DbWebhookCallRepository,
};
use crate::infra::http::{HttpMailProvider, HttpWebhookTransport};
use crate::usecase::idempotency::IdempotencyService;
use crate::usecase::jobs::JobQueue;
use crate::usecase::rate_limit::RateLimiter;
use crate::usecase::webhook_delivery::{RetryPolicy, WebhookDeliveryTracker};
use crate::usecase::webhook_emit::WebhookEmitter;

pub type DbWebhookEmitter =
    WebhookEmitter<DbSubscriptionRepository, DbWebhookCallRepository, DbJobRepository>;

pub type DbDeliveryTracker = WebhookDeliveryTracker<
    DbWebhookCallRepository,
    DbSubscriptionRepository,
    HttpWebhookTransport,
    DbJobRepository,
>;

/// Shared application state passed to every handler via axum `State` and to
/// every job handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub redis: RedisPool,
    /// Webhook deliveries: short timeout, no redirects.
    pub webhook_client: Client,
    pub mail_client: Client,
    pub config: Arc<DeliveryConfig>,
}

impl AppState {
    pub fn idempotency_repo(&self) -> DbIdempotencyRepository {
        DbIdempotencyRepository {
            db: self.db.clone(),
        }
    }

    pub fn subscription_repo(&self) -> DbSubscriptionRepository {
        DbSubscriptionRepository {
            db: self.db.clone(),
        }
    }

    pub fn webhook_call_repo(&self) -> DbWebhookCallRepository {
        DbWebhookCallRepository {
            db: self.db.clone(),
        }
    }

    pub fn job_repo(&self) -> DbJobRepository {
        DbJobRepository {
            db: self.db.clone(),
        }
    }

    pub fn lock_store(&self) -> RedisLockStore {
        RedisLockStore {
            pool: self.redis.clone(),
        }
    }

    pub fn webhook_transport(&self) -> HttpWebhookTransport {
        HttpWebhookTransport {
            client: self.webhook_client.clone(),
        }
    }

    pub fn mail_provider(&self) -> HttpMailProvider {
        HttpMailProvider {
            client: self.mail_client.clone(),
            url: self.config.mail_provider_url.clone(),
            token: self.config.mail_provider_token.clone(),
        }
    }

    pub fn job_queue(&self) -> JobQueue<DbJobRepository> {
        JobQueue::new(self.job_repo())
    }

    pub fn idempotency_service(&self) -> IdempotencyService<RedisLockStore, DbIdempotencyRepository> {
        IdempotencyService {
            locks: self.lock_store(),
            records: self.idempotency_repo(),
            lock_ttl: self.config.idempotency_lock_ttl,
            record_ttl: self.config.idempotency_record_ttl,
        }
    }

    pub fn send_rate_limiter(&self) -> RateLimiter<RedisLockStore> {
        RateLimiter {
            store: self.lock_store(),
            scope: "emails",
            limit: self.config.send_rate_limit_per_sec,
            window: Duration::from_secs(1),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base: self.config.webhook_backoff_base,
            max: self.config.webhook_backoff_max,
            ..RetryPolicy::default()
        }
    }

    pub fn webhook_emitter(&self) -> DbWebhookEmitter {
        WebhookEmitter {
            subscriptions: self.subscription_repo(),
            calls: self.webhook_call_repo(),
            jobs: self.job_queue(),
            max_attempts: self.config.webhook_max_attempts,
        }
    }

    pub fn delivery_tracker(&self) -> DbDeliveryTracker {
        WebhookDeliveryTracker {
            calls: self.webhook_call_repo(),
            subscriptions: self.subscription_repo(),
            transport: self.webhook_transport(),
            jobs: self.job_queue(),
            retry: self.retry_policy(),
        }
    }
}
