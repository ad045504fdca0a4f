use std::time::Duration;

/// Delivery service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL (idempotency locks, result cache, rate limits).
    pub redis_url: String,
    /// TCP port to listen on (default 3120). Env var: `DELIVERY_PORT`.
    pub delivery_port: u16,
    /// Mail provider send endpoint. Env var: `MAIL_PROVIDER_URL`.
    pub mail_provider_url: String,
    /// Bearer token for the mail provider. Env var: `MAIL_PROVIDER_TOKEN`.
    pub mail_provider_token: String,
    pub webhook_timeout: Duration,
    pub webhook_max_attempts: u32,
    pub webhook_backoff_base: Duration,
    pub webhook_backoff_max: Duration,
    pub idempotency_lock_ttl: Duration,
    pub idempotency_record_ttl: Duration,
    /// Sends allowed per team per second.
    pub send_rate_limit_per_sec: u64,
    pub job_poll_interval: Duration,
    /// Worker tasks per queue.
    pub job_concurrency: usize,
    pub webhook_call_retention_days: i64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl DeliveryConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            redis_url: std::env::var("REDIS_URL").expect("REDIS_URL"),
            delivery_port: env_or("DELIVERY_PORT", 3120),
            mail_provider_url: std::env::var("MAIL_PROVIDER_URL").expect("MAIL_PROVIDER_URL"),
            mail_provider_token: std::env::var("MAIL_PROVIDER_TOKEN")
                .expect("MAIL_PROVIDER_TOKEN"),
            webhook_timeout: Duration::from_secs(env_or("WEBHOOK_TIMEOUT_SECS", 10)),
            webhook_max_attempts: env_or("WEBHOOK_MAX_ATTEMPTS", 6),
            webhook_backoff_base: Duration::from_secs(env_or("WEBHOOK_BACKOFF_BASE_SECS", 30)),
            webhook_backoff_max: Duration::from_secs(env_or("WEBHOOK_BACKOFF_MAX_SECS", 3600)),
            idempotency_lock_ttl: Duration::from_secs(env_or("IDEMPOTENCY_LOCK_TTL_SECS", 30)),
            idempotency_record_ttl: Duration::from_secs(env_or(
                "IDEMPOTENCY_RECORD_TTL_SECS",
                86_400,
            )),
            send_rate_limit_per_sec: env_or("SEND_RATE_LIMIT_PER_SEC", 10),
            job_poll_interval: Duration::from_millis(env_or("JOB_POLL_INTERVAL_MS", 500)),
            job_concurrency: env_or("JOB_CONCURRENCY", 4),
            webhook_call_retention_days: env_or("WEBHOOK_CALL_RETENTION_DAYS", 30),
        }
    }
}
