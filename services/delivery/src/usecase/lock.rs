use std::time::Duration;

use courier_domain::id::TeamId;

use crate::domain::repository::LockStore;
use crate::error::DeliveryServiceError;

pub fn idempotency_lock_key(team_id: TeamId, key: &str) -> String {
    format!("idempotency:lock:{team_id}:{key}")
}

/// Proof of holding a lock. Release with [`DistributedLock::release`];
/// dropping it leaves the lock to expire.
#[derive(Debug)]
#[must_use = "release the lock when done"]
pub struct LockGuard {
    key: String,
    token: String,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Non-blocking mutual exclusion on a [`LockStore`].
pub struct DistributedLock<'a, L: LockStore> {
    pub store: &'a L,
    pub ttl: Duration,
}

impl<'a, L: LockStore> DistributedLock<'a, L> {
    pub fn new(store: &'a L, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// `None` when someone else holds the lock.
    pub async fn try_acquire(
        &self,
        key: String,
    ) -> Result<Option<LockGuard>, DeliveryServiceError> {
        let token = uuid::Uuid::new_v4().to_string();
        let acquired = self.store.set_if_absent(&key, &token, self.ttl).await?;
        Ok(acquired.then_some(LockGuard { key, token }))
    }

    /// Release if still held by this guard. A lock that expired and was taken
    /// by someone else is left alone; returns `false` in that case.
    pub async fn release(&self, guard: LockGuard) -> Result<bool, DeliveryServiceError> {
        self.store.compare_and_delete(&guard.key, &guard.token).await
    }
}
