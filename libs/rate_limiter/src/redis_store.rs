use crate::{RateLimitError, RateLimitStore, WindowHit};
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::Script;
use std::time::Duration;

pub type RedisPool = Pool;

// INCR and the first PEXPIRE run as one script, so concurrent instances
// never see a counter without an expiry.
const FIXED_WINDOW_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

pub async fn create_pool(redis_url: &str) -> Result<RedisPool, RateLimitError> {
    let cfg = Config::from_url(redis_url);
    let pool = cfg
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| RateLimitError::Config(e.to_string()))?;
    Ok(pool)
}

/// Fixed-window counters shared by every instance pointing at the same Redis.
///
/// Expiry is delegated to Redis key TTLs, so [`RateLimitStore::sweep`] has
/// nothing to do.
pub struct RedisStore {
    pool: RedisPool,
    script: Script,
}

impl RedisStore {
    pub fn new(pool: RedisPool) -> Self {
        Self {
            pool,
            script: Script::new(FIXED_WINDOW_SCRIPT),
        }
    }

    fn redis_key(key: &str) -> String {
        format!("rate_limit:{}", key)
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitError> {
        let mut conn = self.pool.get().await?;
        let window_ms = window.as_millis().max(1) as u64;

        let (count, ttl_ms): (i64, i64) = self
            .script
            .key(Self::redis_key(key))
            .arg(window_ms)
            .invoke_async(&mut *conn)
            .await?;

        Ok(WindowHit {
            count: u32::try_from(count).unwrap_or(u32::MAX),
            resets_in: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }

    async fn sweep(&self) -> usize {
        0
    }
}
