use crate::store::{KvStore, StoreError};
use std::sync::Arc;

/// Start of the fixed-width window containing `now`. All events landing in
/// the same `period`-wide aligned window share one counter; this is a
/// deliberate simplification over a rolling window.
pub fn bucket_start(now: u64, period: u64) -> u64 {
    let period = period.max(1);
    now / period * period
}

/// Identifies one counter: a check, a guild, and optionally a user subject
/// (guild-wide counters omit the subject).
#[derive(Clone, Copy, Debug)]
pub struct CounterKey<'a> {
    pub check: &'a str,
    pub guild_id: u64,
    pub subject_id: Option<u64>,
}

impl CounterKey<'_> {
    fn storage_key(&self, bucket: u64) -> String {
        match self.subject_id {
            Some(user) => format!(
                "automod:check_{}:{}:{}:{}",
                self.check, self.guild_id, user, bucket
            ),
            None => format!("automod:check_{}:{}:{}", self.check, self.guild_id, bucket),
        }
    }
}

/// Time-bucketed increment-and-expire counters over the key-value store.
///
/// The store's increment primitive is atomic, so concurrent pipeline runs
/// for the same subject accumulate correctly regardless of completion order.
#[derive(Clone)]
pub struct RateCounter {
    store: Arc<dyn KvStore>,
}

impl RateCounter {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Increment the counter for the bucket containing `now` and return the
    /// new bucket total. Refreshes the bucket's TTL of `2 x period` so idle
    /// counters age out of the store.
    pub async fn increment(
        &self,
        key: &CounterKey<'_>,
        amount: i64,
        period: u64,
        now: u64,
    ) -> Result<i64, StoreError> {
        let storage_key = key.storage_key(bucket_start(now, period));
        let total = self.store.incr_by(&storage_key, amount).await?;
        self.store.expire(&storage_key, period * 2).await?;
        Ok(total)
    }

    /// Current bucket total without side effects. Used when a check needs to
    /// test a count before committing, and by dry-run evaluation.
    pub async fn current(
        &self,
        key: &CounterKey<'_>,
        period: u64,
        now: u64,
    ) -> Result<i64, StoreError> {
        let storage_key = key.storage_key(bucket_start(now, period));
        match self.store.get(&storage_key).await? {
            Some(raw) => raw
                .parse()
                .map_err(|_| StoreError::Value(format!("non-integer counter at {storage_key}"))),
            None => Ok(0),
        }
    }
}
