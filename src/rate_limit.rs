use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Rolling-window counter keyed by (subject, operation, window).
#[async_trait]
pub trait RateLimiter: Send + Sync + 'static {
    /// Records an attempt at `now` unless `limit` attempts already fall inside
    /// the trailing `window`. Rejected attempts are not recorded.
    async fn check(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RateLimitResult>;
}

pub type DynRateLimiter = Arc<dyn RateLimiter>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Under the limit, includes the count after this attempt.
    Allowed(i64),
    /// Over the limit, includes the count already inside the window.
    Exceeded(i64),
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed(_))
    }
}

pub fn rate_limit_key(operation: &str, subject: &str, window: Duration) -> String {
    format!("ratelimit:{}:{}:{}", operation, subject, window.num_seconds())
}

mod inmem {
    use super::*;
    use lru::LruCache;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::num::NonZeroUsize;

    /// Process-local limiter. Tracks at most `capacity` keys; the least
    /// recently used key is forgotten first.
    pub struct InMemoryRateLimiter {
        inner: Mutex<LruCache<String, VecDeque<DateTime<Utc>>>>,
    }

    impl InMemoryRateLimiter {
        pub fn new(capacity: usize) -> Self {
            let nz = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
            Self {
                inner: Mutex::new(LruCache::new(nz)),
            }
        }

        pub fn into_arc(self) -> DynRateLimiter {
            Arc::new(self)
        }
    }

    #[async_trait]
    impl RateLimiter for InMemoryRateLimiter {
        async fn check(
            &self,
            key: &str,
            limit: u32,
            window: Duration,
            now: DateTime<Utc>,
        ) -> anyhow::Result<RateLimitResult> {
            let cutoff = now - window;
            let mut guard = self.inner.lock();
            let hits = guard.get_or_insert_mut(key.to_string(), VecDeque::new);
            while hits.front().is_some_and(|t| *t <= cutoff) {
                hits.pop_front();
            }
            let count = hits.len() as i64;
            if count >= i64::from(limit) {
                return Ok(RateLimitResult::Exceeded(count));
            }
            hits.push_back(now);
            Ok(RateLimitResult::Allowed(count + 1))
        }
    }
}

pub use inmem::InMemoryRateLimiter;

mod redis_backend {
    use super::*;
    use redis::aio::MultiplexedConnection;
    use redis::Client;

    /// Sorted-set limiter: one member per accepted attempt, scored by millis.
    pub struct RedisRateLimiter {
        conn: MultiplexedConnection,
    }

    impl RedisRateLimiter {
        pub async fn new(url: &str) -> anyhow::Result<Self> {
            let client = Client::open(url)?;
            let conn = client.get_multiplexed_async_connection().await?;
            Ok(Self { conn })
        }

        pub fn into_arc(self) -> DynRateLimiter {
            Arc::new(self)
        }
    }

    #[async_trait]
    impl RateLimiter for RedisRateLimiter {
        async fn check(
            &self,
            key: &str,
            limit: u32,
            window: Duration,
            now: DateTime<Utc>,
        ) -> anyhow::Result<RateLimitResult> {
            let mut conn = self.conn.clone();
            let now_ms = now.timestamp_millis();
            let window_ms = window.num_milliseconds();

            // record first, then count, all inside one MULTI so concurrent
            // callers are serialized by Redis
            let member = format!("{}-{}", now_ms, uuid::Uuid::new_v4());
            let (count,): (i64,) = redis::pipe()
                .atomic()
                .cmd("ZREMRANGEBYSCORE")
                .arg(key)
                .arg("-inf")
                .arg(now_ms - window_ms)
                .ignore()
                .cmd("ZADD")
                .arg(key)
                .arg(now_ms)
                .arg(&member)
                .ignore()
                .cmd("ZCARD")
                .arg(key)
                .cmd("PEXPIRE")
                .arg(key)
                .arg(window_ms)
                .ignore()
                .query_async(&mut conn)
                .await?;

            if count > i64::from(limit) {
                // rejected attempts are not counted
                let _: i64 = redis::cmd("ZREM").arg(key).arg(&member).query_async(&mut conn).await?;
                return Ok(RateLimitResult::Exceeded(count - 1));
            }

            Ok(RateLimitResult::Allowed(count))
        }
    }
}

pub use redis_backend::RedisRateLimiter;
