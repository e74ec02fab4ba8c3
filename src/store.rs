use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors surfaced by key-value store implementations.
///
/// `Unavailable` is the fail-open trigger: a check that cannot complete its
/// counter operation treats the check as inconclusive and passes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected stored value: {0}")]
    Value(String),
}

/// Asynchronous key-value store contract the engine runs against.
///
/// Increment operations must be atomic; the engine never does a
/// read-modify-write round trip for counter values. Hash field order must be
/// preserved for small hashes (rule evaluation order relies on it, the same
/// way Redis listpack-encoded hashes behave).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), StoreError>;
    async fn del(&self, key: &str) -> Result<(), StoreError>;
    async fn incr_by(&self, key: &str, by: i64) -> Result<i64, StoreError>;
    async fn expire(&self, key: &str, ttl: u64) -> Result<bool, StoreError>;

    async fn hincr_by(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError>;
    async fn hkeys(&self, key: &str) -> Result<Vec<String>, StoreError>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError>;

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError>;
    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError>;
    async fn zrembyscore(&self, key: &str, min: f64, max: f64) -> Result<i64, StoreError>;
}

#[derive(Default)]
struct Expiring<T> {
    value: T,
    deadline: Option<Instant>,
}

impl<T> Expiring<T> {
    fn live(&self) -> bool {
        self.deadline.map_or(true, |d| Instant::now() < d)
    }
}

#[derive(Default)]
struct MemoryInner {
    strings: HashMap<String, Expiring<String>>,
    // Vec keeps field insertion order, which rule enumeration depends on
    hashes: HashMap<String, Expiring<Vec<(String, String)>>>,
    zsets: HashMap<String, Expiring<Vec<(String, f64)>>>,
}

impl MemoryInner {
    fn drop_dead(&mut self, key: &str) {
        if self.strings.get(key).is_some_and(|e| !e.live()) {
            self.strings.remove(key);
        }
        if self.hashes.get(key).is_some_and(|e| !e.live()) {
            self.hashes.remove(key);
        }
        if self.zsets.get(key).is_some_and(|e| !e.live()) {
            self.zsets.remove(key);
        }
    }
}

/// In-memory store with lazy TTL expiry.
///
/// Backs the test suite and single-process deployments where an external
/// store is not worth running. Not a shared source of truth across
/// processes; production multi-process setups use [`crate::RedisStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn ttl_deadline(ttl: u64) -> Option<Instant> {
    Some(Instant::now() + Duration::from_secs(ttl))
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.write().await;
        inner.drop_dead(key);
        Ok(inner.strings.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.strings.insert(
            key.to_string(),
            Expiring {
                value: value.to_string(),
                deadline: ttl.and_then(ttl_deadline),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.strings.remove(key);
        inner.hashes.remove(key);
        inner.zsets.remove(key);
        Ok(())
    }

    async fn incr_by(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let mut inner = self.inner.write().await;
        inner.drop_dead(key);
        let entry = inner.strings.entry(key.to_string()).or_default();
        let current: i64 = if entry.value.is_empty() {
            0
        } else {
            entry
                .value
                .parse()
                .map_err(|_| StoreError::Value(format!("non-integer counter at {key}")))?
        };
        let next = current + by;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: u64) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        inner.drop_dead(key);
        let deadline = ttl_deadline(ttl);
        let mut touched = false;
        if let Some(e) = inner.strings.get_mut(key) {
            e.deadline = deadline;
            touched = true;
        }
        if let Some(e) = inner.hashes.get_mut(key) {
            e.deadline = deadline;
            touched = true;
        }
        if let Some(e) = inner.zsets.get_mut(key) {
            e.deadline = deadline;
            touched = true;
        }
        Ok(touched)
    }

    async fn hincr_by(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError> {
        let mut inner = self.inner.write().await;
        inner.drop_dead(key);
        let entry = inner.hashes.entry(key.to_string()).or_default();
        if let Some((_, v)) = entry.value.iter_mut().find(|(f, _)| f == field) {
            let current: i64 = v
                .parse()
                .map_err(|_| StoreError::Value(format!("non-integer hash field {field}")))?;
            let next = current + by;
            *v = next.to_string();
            Ok(next)
        } else {
            entry.value.push((field.to_string(), by.to_string()));
            Ok(by)
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.write().await;
        inner.drop_dead(key);
        Ok(inner.hashes.get(key).and_then(|e| {
            e.value
                .iter()
                .find(|(f, _)| f == field)
                .map(|(_, v)| v.clone())
        }))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.drop_dead(key);
        let entry = inner.hashes.entry(key.to_string()).or_default();
        if let Some((_, v)) = entry.value.iter_mut().find(|(f, _)| f == field) {
            *v = value.to_string();
        } else {
            entry.value.push((field.to_string(), value.to_string()));
        }
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(e) = inner.hashes.get_mut(key) {
            e.value.retain(|(f, _)| f != field);
        }
        Ok(())
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut inner = self.inner.write().await;
        inner.drop_dead(key);
        Ok(inner
            .hashes
            .get(key)
            .map(|e| e.value.iter().map(|(f, _)| f.clone()).collect())
            .unwrap_or_default())
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut inner = self.inner.write().await;
        inner.drop_dead(key);
        Ok(inner
            .hashes
            .get(key)
            .map(|e| e.value.clone())
            .unwrap_or_default())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.drop_dead(key);
        let entry = inner.zsets.entry(key.to_string()).or_default();
        if let Some((_, s)) = entry.value.iter_mut().find(|(m, _)| m == member) {
            *s = score;
        } else {
            entry.value.push((member.to_string(), score));
        }
        Ok(())
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let mut inner = self.inner.write().await;
        inner.drop_dead(key);
        let mut members = inner
            .zsets
            .get(key)
            .map(|e| e.value.clone())
            .unwrap_or_default();
        members.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let len = members.len() as isize;
        let resolve = |i: isize| -> isize {
            if i < 0 {
                len + i
            } else {
                i
            }
        };
        let start = resolve(start).max(0);
        let stop = resolve(stop).min(len - 1);
        if start > stop || len == 0 {
            return Ok(Vec::new());
        }
        Ok(members[start as usize..=stop as usize].to_vec())
    }

    async fn zrembyscore(&self, key: &str, min: f64, max: f64) -> Result<i64, StoreError> {
        let mut inner = self.inner.write().await;
        inner.drop_dead(key);
        let Some(entry) = inner.zsets.get_mut(key) else {
            return Ok(0);
        };
        let before = entry.value.len();
        entry.value.retain(|(_, s)| *s < min || *s > max);
        Ok((before - entry.value.len()) as i64)
    }
}
