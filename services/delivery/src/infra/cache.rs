use std::time::Duration;

use anyhow::Context as _;
use deadpool_redis::redis::{AsyncCommands, Script};
use deadpool_redis::{Connection, Pool};

use crate::domain::repository::LockStore;
use crate::error::DeliveryServiceError;

/// Delete the key only if it still holds the caller's token.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Increment and start the window TTL on the first hit.
const INCR_WITH_EXPIRY: &str = r#"
local n = redis.call("INCR", KEYS[1])
if n == 1 then
    redis.call("PEXPIRE", KEYS[1], ARGV[1])
end
return n
"#;

#[derive(Clone)]
pub struct RedisLockStore {
    pub pool: Pool,
}

impl RedisLockStore {
    async fn conn(&self) -> Result<Connection, DeliveryServiceError> {
        Ok(self.pool.get().await.context("get redis connection")?)
    }

    /// `PING`, for readiness probes.
    pub async fn ping(&self) -> bool {
        let Ok(mut conn) = self.conn().await else {
            return false;
        };
        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl LockStore for RedisLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, DeliveryServiceError> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = deadpool_redis::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .context("redis SET NX")?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<bool, DeliveryServiceError> {
        let mut conn = self.conn().await?;
        let deleted: i64 = Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .context("redis compare-and-delete")?;
        Ok(deleted == 1)
    }

    async fn incr_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<u64, DeliveryServiceError> {
        let mut conn = self.conn().await?;
        let n: u64 = Script::new(INCR_WITH_EXPIRY)
            .key(key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .context("redis incr with expiry")?;
        Ok(n)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, DeliveryServiceError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await.context("redis GET")?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DeliveryServiceError> {
        let mut conn = self.conn().await?;
        let (): () = conn
            .pset_ex(key, value, ttl_millis(ttl))
            .await
            .context("redis PSETEX")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DeliveryServiceError> {
        let mut conn = self.conn().await?;
        let (): () = conn.del(key).await.context("redis DEL")?;
        Ok(())
    }
}
