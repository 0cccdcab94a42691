use crate::infrastructure::queue::QueueError;
use crate::infrastructure::redis::client::RedisService;
use async_trait::async_trait;
use redis::Script;
use std::time::Duration;

/// KEYS: lease. ARGV: token, ttl ms. The current holder re-acquiring refreshes the TTL.
const ACQUIRE: &str = r"
local holder = redis.call('GET', KEYS[1])
if holder == ARGV[1] then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
  return 1
end
if holder then
  return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
return 1
";

const RELEASE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
";

/// Short-lived exclusive ownership of a named resource.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// `true` when `token` now holds `name`, including when it already did.
    async fn try_acquire(&self, name: &str, token: &str, ttl: Duration) -> Result<bool, QueueError>;

    /// Releases `name` only if `token` still holds it.
    async fn release(&self, name: &str, token: &str) -> Result<(), QueueError>;
}

#[derive(Clone)]
pub struct RedisLeaseStore {
    redis: RedisService,
    acquire: Script,
    release: Script,
}

impl RedisLeaseStore {
    pub fn new(redis: RedisService) -> Self {
        Self {
            redis,
            acquire: Script::new(ACQUIRE),
            release: Script::new(RELEASE),
        }
    }

    fn key(name: &str) -> String {
        format!("lease:{}", name)
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn try_acquire(&self, name: &str, token: &str, ttl: Duration) -> Result<bool, QueueError> {
        let mut conn = self.redis.conn();
        let acquired: i64 = self
            .acquire
            .key(Self::key(name))
            .arg(token)
            .arg(ttl.as_millis().max(1) as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(acquired == 1)
    }

    async fn release(&self, name: &str, token: &str) -> Result<(), QueueError> {
        let mut conn = self.redis.conn();
        let _: i64 = self
            .release
            .key(Self::key(name))
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
