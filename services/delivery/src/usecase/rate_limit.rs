use std::time::Duration;

use chrono::{DateTime, Utc};

use courier_domain::id::TeamId;

use crate::domain::repository::LockStore;
use crate::error::DeliveryServiceError;

/// Fixed-window counter per team on the shared [`LockStore`].
pub struct RateLimiter<L: LockStore> {
    pub store: L,
    pub scope: &'static str,
    pub limit: u64,
    pub window: Duration,
}

impl<L: LockStore> RateLimiter<L> {
    fn window_key(&self, team_id: TeamId, now: DateTime<Utc>) -> String {
        let window_ms = self.window.as_millis().max(1) as i64;
        let index = now.timestamp_millis() / window_ms;
        format!("ratelimit:{}:{team_id}:{index}", self.scope)
    }

    /// Count one request; `RateLimited` once the window is full.
    pub async fn check(&self, team_id: TeamId) -> Result<(), DeliveryServiceError> {
        self.check_at(team_id, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        team_id: TeamId,
        now: DateTime<Utc>,
    ) -> Result<(), DeliveryServiceError> {
        let key = self.window_key(team_id, now);
        let count = self.store.incr_with_expiry(&key, self.window).await?;
        if count > self.limit {
            tracing::debug!(team_id = %team_id, scope = self.scope, count, "rate limited");
            return Err(DeliveryServiceError::RateLimited);
        }
        Ok(())
    }
}
