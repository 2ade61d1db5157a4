use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use haven_core::models::RateLimitRecord;
use haven_core::repository::RateLimitStore;
use haven_core::StoreResult;
use redis::RedisResult;
use tracing::debug;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Bumps the counter for `key`, opening a window of `window_seconds` on
    /// the first hit. Returns the count and the seconds left in the window.
    pub async fn incr_window(&self, key: &str, window_seconds: i64) -> RedisResult<(i64, i64)> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        // EXPIRE only on the first hit so later attempts cannot stretch the window
        let script = redis::Script::new(
            r#"
            local count = redis.call("INCR", KEYS[1])
            if count == 1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
            end
            local ttl = redis.call("TTL", KEYS[1])
            if ttl < 0 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
                ttl = tonumber(ARGV[1])
            end
            return {count, ttl}
        "#,
        );

        script
            .key(key)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await
    }
}

#[async_trait]
impl RateLimitStore for RedisClient {
    async fn record_attempt(
        &self,
        identifier: &str,
        action: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<RateLimitRecord> {
        let key = format!("rate_limit:{}:{}", action, identifier);
        let (count, ttl) = self.incr_window(&key, window.num_seconds().max(1)).await?;
        debug!("Rate limit {} at {} ({}s left)", key, count, ttl);

        let window_expires = now + Duration::seconds(ttl.max(0));
        Ok(RateLimitRecord {
            identifier: identifier.to_string(),
            action: action.to_string(),
            attempt_count: count.clamp(0, i64::from(u32::MAX)) as u32,
            window_start: window_expires - window,
            window_expires,
        })
    }
}
