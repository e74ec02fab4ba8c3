use crate::message::MessageFacts;
use crate::store::{KvStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

fn pending_key(channel_id: u64, message_id: u64) -> String {
    format!("automod:snipe:pending:{}:{}", channel_id, message_id)
}

fn channel_key(channel_id: u64) -> String {
    format!("automod:snipe:{}", channel_id)
}

/// Snapshot of a message kept for recall after deletion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnipeEntry {
    pub content: String,
    pub author_id: u64,
    pub author_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Recall store for recently deleted messages.
///
/// Messages are cached on receipt under a short-lived pending key; the
/// host's deletion notification promotes them into a per-channel sorted set
/// scored by deletion time. Everything ages out after the retention window.
#[derive(Clone)]
pub struct SnipeCache {
    store: Arc<dyn KvStore>,
    retention_secs: u64,
}

impl SnipeCache {
    pub fn new(store: Arc<dyn KvStore>, retention_secs: u64) -> Self {
        Self {
            store,
            retention_secs,
        }
    }

    /// Cache an inbound message so it can be recalled if deleted soon after.
    pub async fn remember(&self, facts: &MessageFacts) -> Result<(), StoreError> {
        let entry = SnipeEntry {
            content: facts.content.clone(),
            author_id: facts.author_id,
            author_name: facts.author_name.clone(),
            timestamp: Utc::now(),
        };
        let payload = serde_json::to_string(&entry)
            .map_err(|e| StoreError::Value(e.to_string()))?;
        self.store
            .set(
                &pending_key(facts.channel_id, facts.message_id),
                &payload,
                Some(self.retention_secs),
            )
            .await
    }

    /// Promote a pending entry into the channel's retained set. Returns
    /// false when nothing was cached for the deleted message (already
    /// expired, or the message predates this process).
    pub async fn promote(&self, channel_id: u64, message_id: u64) -> Result<bool, StoreError> {
        let key = pending_key(channel_id, message_id);
        let Some(payload) = self.store.get(&key).await? else {
            debug!(channel_id, message_id, "no cached entry for deleted message");
            return Ok(false);
        };
        self.store.del(&key).await?;

        let deleted_at = Utc::now().timestamp() as f64;
        let set_key = channel_key(channel_id);
        self.store.zadd(&set_key, deleted_at, &payload).await?;
        // retention policy: drop anything older than the window
        self.store
            .zrembyscore(&set_key, 0.0, deleted_at - self.retention_secs as f64)
            .await?;
        self.store.expire(&set_key, self.retention_secs).await?;
        Ok(true)
    }

    /// Most recently deleted messages for a channel, newest first.
    pub async fn recall(
        &self,
        channel_id: u64,
        limit: usize,
    ) -> Result<Vec<SnipeEntry>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let raw = self
            .store
            .zrevrange_withscores(&channel_key(channel_id), 0, limit as isize - 1)
            .await?;
        Ok(raw
            .into_iter()
            .filter_map(|(payload, _)| serde_json::from_str(&payload).ok())
            .collect())
    }
}
