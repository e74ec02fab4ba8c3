use crate::store::{KvStore, StoreError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, RedisError};

fn unavailable(e: RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Redis-backed store used when moderation state must be shared across
/// processes. The connection manager transparently reconnects; individual
/// command failures surface as [`StoreError::Unavailable`] and the engine
/// fails open.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect from a `redis://` / `rediss://` URL.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        if !redis_url.contains("://") {
            return Err(anyhow::anyhow!(
                "Invalid Redis URL format. Expected: redis://[:password@]host:port"
            ));
        }

        let client = redis::Client::open(redis_url)
            .context("Failed to create Redis client from URL")?;

        let manager = ConnectionManager::new(client)
            .await
            .context("Failed to create Redis connection manager")?;

        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(unavailable)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(seconds) => conn.set_ex(key, value, seconds).await.map_err(unavailable),
            None => conn.set(key, value).await.map_err(unavailable),
        }
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.del(key).await.map_err(unavailable)
    }

    async fn incr_by(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let mut conn = self.manager.clone();
        conn.incr(key, by).await.map_err(unavailable)
    }

    async fn expire(&self, key: &str, ttl: u64) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        conn.expire(key, ttl as i64).await.map_err(unavailable)
    }

    async fn hincr_by(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError> {
        let mut conn = self.manager.clone();
        conn.hincr(key, field, by).await.map_err(unavailable)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        conn.hget(key, field).await.map_err(unavailable)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.hset(key, field, value).await.map_err(unavailable)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.hdel(key, field).await.map_err(unavailable)
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        conn.hkeys(key).await.map_err(unavailable)
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.manager.clone();
        // flat field/value array parses pairwise; avoids the unordered HashMap form
        redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.zadd(key, member, score).await.map_err(unavailable)
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let mut conn = self.manager.clone();
        redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn zrembyscore(&self, key: &str, min: f64, max: f64) -> Result<i64, StoreError> {
        let mut conn = self.manager.clone();
        conn.zrembyscore(key, min, max).await.map_err(unavailable)
    }
}
