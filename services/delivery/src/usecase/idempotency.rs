use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use courier_domain::id::TeamId;

use crate::domain::canonical::CanonicalValue;
use crate::domain::repository::{IdempotencyRepository, LockStore};
use crate::domain::types::{IDEMPOTENCY_KEY_MAX_LEN, IdempotencyRecord};
use crate::error::DeliveryServiceError;
use crate::usecase::lock::{DistributedLock, idempotency_lock_key};

const STORE_ATTEMPTS: usize = 3;

fn record_cache_key(team_id: TeamId, key: &str) -> String {
    format!("idempotency:record:{team_id}:{key}")
}

fn validate_key(key: &str) -> Result<(), DeliveryServiceError> {
    if key.is_empty() || key.chars().count() > IDEMPOTENCY_KEY_MAX_LEN {
        return Err(DeliveryServiceError::InvalidIdempotencyKey);
    }
    Ok(())
}

/// At-most-once execution per `(team, idempotency key)`.
///
/// Redis guards the in-flight window with a short lock; Postgres holds the
/// completed result for the retention window and is where payload conflicts
/// are decided. Results are also cached in Redis to keep the hot path off
/// the database.
pub struct IdempotencyService<L, R>
where
    L: LockStore,
    R: IdempotencyRepository,
{
    pub locks: L,
    pub records: R,
    pub lock_ttl: Duration,
    pub record_ttl: Duration,
}

impl<L, R> IdempotencyService<L, R>
where
    L: LockStore,
    R: IdempotencyRepository,
{
    /// Run `operation` once for this key and payload and replay its result
    /// afterwards. Without a key the operation simply runs.
    pub async fn execute<T, F, Fut>(
        &self,
        team_id: TeamId,
        idempotency_key: Option<&str>,
        payload: &CanonicalValue,
        operation: F,
    ) -> Result<T, DeliveryServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DeliveryServiceError>>,
    {
        let Some(key) = idempotency_key else {
            return operation().await;
        };
        validate_key(key)?;
        let payload_hash = payload.hash();

        if let Some(record) = self.lookup(team_id, key, Utc::now()).await? {
            return replay(&record, &payload_hash);
        }

        let lock = DistributedLock::new(&self.locks, self.lock_ttl);
        let Some(guard) = lock.try_acquire(idempotency_lock_key(team_id, key)).await? else {
            tracing::debug!(
                team_id = %team_id,
                idempotency_key = key,
                "idempotent request in progress"
            );
            return Err(DeliveryServiceError::IdempotencyRequestInProgress);
        };

        let outcome = self
            .run_locked(team_id, key, &payload_hash, operation)
            .await;

        if let Err(e) = lock.release(guard).await {
            tracing::warn!(
                error = ?e,
                team_id = %team_id,
                idempotency_key = key,
                "failed to release idempotency lock"
            );
        }
        outcome
    }

    async fn run_locked<T, F, Fut>(
        &self,
        team_id: TeamId,
        key: &str,
        payload_hash: &str,
        operation: F,
    ) -> Result<T, DeliveryServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DeliveryServiceError>>,
    {
        // A previous holder may have finished between the first lookup and the lock.
        if let Some(record) = self.records.find_active(team_id, key, Utc::now()).await? {
            return replay(&record, payload_hash);
        }

        let value = operation().await?;
        Ok(self.store(team_id, key, payload_hash, value).await)
    }

    /// Persist the result of an operation that already ran. Its side effect has
    /// happened, so failures here are logged and the value is still returned.
    async fn store<T>(
        &self,
        team_id: TeamId,
        key: &str,
        payload_hash: &str,
        value: T,
    ) -> T
    where
        T: Serialize + DeserializeOwned,
    {
        let now = Utc::now();
        let response = match serde_json::to_value(&value) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    team_id = %team_id,
                    idempotency_key = key,
                    "failed to encode idempotent response"
                );
                return value;
            }
        };
        let record = IdempotencyRecord {
            team_id,
            key: key.to_owned(),
            payload_hash: payload_hash.to_owned(),
            response,
            created_at: now,
            expires_at: now + chrono_ttl(self.record_ttl),
        };

        let mut last_error = None;
        for _ in 0..STORE_ATTEMPTS {
            match self.records.insert_if_absent(&record).await {
                Ok(true) => {
                    self.cache(&record, now).await;
                    return value;
                }
                Ok(false) => return self.replay_winner(&record, value, now).await,
                Err(e) => last_error = Some(e),
            }
        }

        // The database is unavailable; the cache keeps replays working until it recovers.
        tracing::error!(
            error = ?last_error,
            team_id = %team_id,
            idempotency_key = key,
            "failed to store idempotency record"
        );
        self.cache(&record, now).await;
        value
    }

    /// Lost a race with a writer whose lock had expired; its record wins.
    async fn replay_winner<T>(&self, record: &IdempotencyRecord, value: T, now: DateTime<Utc>) -> T
    where
        T: DeserializeOwned,
    {
        tracing::warn!(
            team_id = %record.team_id,
            idempotency_key = %record.key,
            "idempotency record already stored by another request"
        );
        match self.records.find_active(record.team_id, &record.key, now).await {
            Ok(Some(stored)) => replay(&stored, &record.payload_hash).unwrap_or(value),
            _ => value,
        }
    }

    async fn lookup(
        &self,
        team_id: TeamId,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>, DeliveryServiceError> {
        let cache_key = record_cache_key(team_id, key);
        match self.locks.get(&cache_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<IdempotencyRecord>(&raw) {
                Ok(record) if !record.is_expired(now) => return Ok(Some(record)),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        cache_key = %cache_key,
                        "dropping unreadable idempotency cache entry"
                    );
                    if let Err(e) = self.locks.delete(&cache_key).await {
                        tracing::warn!(
                            error = ?e,
                            cache_key = %cache_key,
                            "failed to drop idempotency cache entry"
                        );
                    }
                }
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = ?e, "idempotency cache unavailable, reading database"),
        }

        let record = self.records.find_active(team_id, key, now).await?;
        if let Some(record) = &record {
            self.cache(record, now).await;
        }
        Ok(record)
    }

    async fn cache(&self, record: &IdempotencyRecord, now: DateTime<Utc>) {
        let Ok(ttl) = (record.expires_at - now).to_std() else {
            return;
        };
        let Ok(raw) = serde_json::to_string(record) else {
            return;
        };
        let cache_key = record_cache_key(record.team_id, &record.key);
        if let Err(e) = self.locks.set(&cache_key, &raw, ttl).await {
            tracing::warn!(error = ?e, cache_key = %cache_key, "failed to cache idempotency record");
        }
    }
}

fn chrono_ttl(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24))
}

fn replay<T: DeserializeOwned>(
    record: &IdempotencyRecord,
    payload_hash: &str,
) -> Result<T, DeliveryServiceError> {
    if record.payload_hash != payload_hash {
        return Err(DeliveryServiceError::IdempotencyKeyReused);
    }
    serde_json::from_value(record.response.clone())
        .map_err(|e| {
            DeliveryServiceError::Internal(
                anyhow::Error::new(e).context("decode stored idempotent response"),
            )
        })
}
