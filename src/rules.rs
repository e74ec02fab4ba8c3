use crate::checks::CheckKind;
use crate::message::MessageFacts;
use crate::store::{KvStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

fn rules_key(guild_id: u64) -> String {
    format!("automod:rules:{}", guild_id)
}

/// A single bypass condition. A bypass spec is an ordered list of these;
/// any match skips the check (logical OR, short-circuiting).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BypassEntry {
    Role(u64),
    Permission(String),
    Member(u64),
    Channel(u64),
}

/// True if any bypass entry matches the message's sender or channel.
/// An empty spec never bypasses.
pub fn bypassed(entries: &[BypassEntry], facts: &MessageFacts) -> bool {
    entries.iter().any(|entry| match entry {
        BypassEntry::Role(id) => facts.author_roles.contains(id),
        BypassEntry::Permission(name) => facts.author_permissions.contains(name),
        BypassEntry::Member(id) => facts.author_id == *id,
        BypassEntry::Channel(id) => facts.channel_id == *id,
    })
}

/// Stored configuration for one check: parameter overrides, bypass spec,
/// and the actions to run when the check trips.
///
/// Parameters are read field-by-field with per-check defaults, so a value of
/// the wrong type falls back to the default instead of invalidating the rule.
/// Action names stay as stored strings; unknown ones are preserved in storage
/// and skipped at dispatch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckRule {
    pub params: serde_json::Map<String, Value>,
    pub bypass: Vec<BypassEntry>,
    pub actions: BTreeMap<String, Value>,
}

impl CheckRule {
    /// Rule with a single action and default parameters, the shape the
    /// administrative `set` command produces.
    pub fn with_action(action: &str) -> Self {
        let mut actions = BTreeMap::new();
        actions.insert(action.to_string(), Value::Bool(true));
        Self {
            actions,
            ..Self::default()
        }
    }

    /// Forgiving parse of a stored rule payload. Anything malformed degrades
    /// to defaults for that part of the rule only.
    pub fn from_json(raw: &str) -> Self {
        let value: Value = serde_json::from_str(raw).unwrap_or(Value::Null);
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Self {
        let mut params = serde_json::Map::new();
        if let Some(obj) = value.as_object() {
            for (k, v) in obj {
                if k != "bypass" && k != "actions" {
                    params.insert(k.clone(), v.clone());
                }
            }
        }

        let bypass = value
            .get("bypass")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| serde_json::from_value(e.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        let actions = value
            .get("actions")
            .and_then(Value::as_object)
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Self {
            params,
            bypass,
            actions,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut obj = self.params.clone();
        if !self.bypass.is_empty() {
            obj.insert(
                "bypass".to_string(),
                serde_json::to_value(&self.bypass).unwrap_or(Value::Null),
            );
        }
        obj.insert(
            "actions".to_string(),
            Value::Object(self.actions.clone().into_iter().collect()),
        );
        Value::Object(obj)
    }

    fn param_i64(&self, name: &str, default: i64) -> i64 {
        self.params.get(name).and_then(Value::as_i64).unwrap_or(default)
    }

    /// Threshold count, `amount` in storage.
    pub fn amount(&self, default: i64) -> i64 {
        self.param_i64("amount", default)
    }

    /// Window width in seconds, `per` in storage.
    pub fn per(&self, default: u64) -> u64 {
        let per = self.param_i64("per", default as i64);
        if per > 0 {
            per as u64
        } else {
            default
        }
    }

    /// Percentage threshold, `percent` in storage.
    pub fn percent(&self, default: i64) -> i64 {
        self.param_i64("percent", default)
    }
}

/// Per-guild persisted check configuration: one store hash per guild, one
/// field per check name, JSON rule value. Field order is the order checks
/// were enabled, which is also pipeline evaluation order.
#[derive(Clone)]
pub struct RuleStore {
    store: Arc<dyn KvStore>,
}

impl RuleStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn set_rule(
        &self,
        guild_id: u64,
        kind: CheckKind,
        rule: &CheckRule,
    ) -> Result<(), StoreError> {
        let payload = rule.to_value().to_string();
        self.store
            .hset(&rules_key(guild_id), kind.name(), &payload)
            .await
    }

    /// Drop every rule for the guild.
    pub async fn clear(&self, guild_id: u64) -> Result<(), StoreError> {
        self.store.del(&rules_key(guild_id)).await
    }

    /// Names of all configured checks, in enable order. Unknown names that
    /// ended up in storage are included here but never evaluated.
    pub async fn enabled(&self, guild_id: u64) -> Result<Vec<String>, StoreError> {
        self.store.hkeys(&rules_key(guild_id)).await
    }

    pub async fn get(
        &self,
        guild_id: u64,
        kind: CheckKind,
    ) -> Result<Option<CheckRule>, StoreError> {
        Ok(self
            .store
            .hget(&rules_key(guild_id), kind.name())
            .await?
            .map(|raw| CheckRule::from_json(&raw)))
    }

    /// The guild's active rules in evaluation order. Fields whose name does
    /// not match a registered check are skipped but left in storage.
    pub async fn load(&self, guild_id: u64) -> Result<Vec<(CheckKind, CheckRule)>, StoreError> {
        let fields = self.store.hgetall(&rules_key(guild_id)).await?;
        let mut rules = Vec::with_capacity(fields.len());
        for (name, raw) in fields {
            match CheckKind::from_name(&name) {
                Some(kind) => rules.push((kind, CheckRule::from_json(&raw))),
                None => debug!(guild_id, check = %name, "skipping unknown check in stored rules"),
            }
        }
        if rules.is_empty() && !self.store.hkeys(&rules_key(guild_id)).await?.is_empty() {
            warn!(guild_id, "guild ruleset contains only unknown check names");
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Authority, InboundMessage, MessageFacts};
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    fn facts(author_roles: Vec<u64>, permissions: &[&str]) -> MessageFacts {
        MessageFacts::derive(InboundMessage {
            guild_id: 10,
            channel_id: 20,
            message_id: 30,
            author_id: 40,
            author_name: "someone".into(),
            author_is_bot: false,
            author_roles,
            author_permissions: permissions.iter().map(|s| s.to_string()).collect(),
            author_rank: 0,
            bot_authority: Authority::default(),
            content: "hello".into(),
            attachment_count: 0,
            mention_count: 0,
        })
    }

    #[test]
    fn empty_bypass_never_bypasses() {
        assert!(!bypassed(&[], &facts(vec![1, 2], &["manage_messages"])));
    }

    #[test]
    fn role_member_channel_permission_matches() {
        let f = facts(vec![7], &["manage_guild"]);
        assert!(bypassed(&[BypassEntry::Role(7)], &f));
        assert!(!bypassed(&[BypassEntry::Role(8)], &f));
        assert!(bypassed(&[BypassEntry::Member(40)], &f));
        assert!(bypassed(&[BypassEntry::Channel(20)], &f));
        assert!(bypassed(
            &[BypassEntry::Permission("manage_guild".into())],
            &f
        ));
        // any entry matching is enough
        assert!(bypassed(
            &[BypassEntry::Role(99), BypassEntry::Member(40)],
            &f
        ));
    }

    #[test]
    fn rule_round_trips_through_json() {
        let mut rule = CheckRule::with_action("delete");
        rule.params
            .insert("amount".into(), Value::Number(7.into()));
        rule.bypass.push(BypassEntry::Role(5));
        let parsed = CheckRule::from_json(&rule.to_value().to_string());
        assert_eq!(parsed, rule);
        assert_eq!(parsed.amount(1), 7);
    }

    #[test]
    fn malformed_params_fall_back_to_defaults() {
        let rule = CheckRule::from_json(r#"{"amount": "lots", "per": -3, "actions": {"delete": true}}"#);
        assert_eq!(rule.amount(5), 5);
        assert_eq!(rule.per(3), 3);
        assert_eq!(rule.actions.len(), 1);
    }

    #[test]
    fn garbage_payload_degrades_to_default_rule() {
        let rule = CheckRule::from_json("not json at all");
        assert_eq!(rule, CheckRule::default());
    }

    #[test]
    fn malformed_bypass_entries_are_dropped_individually() {
        let rule = CheckRule::from_json(
            r#"{"bypass": [{"kind": "role", "id": 3}, {"kind": "teapot", "id": 1}], "actions": {}}"#,
        );
        assert_eq!(rule.bypass, vec![BypassEntry::Role(3)]);
    }

    #[tokio::test]
    async fn rules_load_in_enable_order_and_skip_unknown_names() {
        let store = Arc::new(MemoryStore::new());
        let rules = RuleStore::new(store.clone());
        rules
            .set_rule(10, CheckKind::Spam, &CheckRule::with_action("delete"))
            .await
            .unwrap();
        rules
            .set_rule(10, CheckKind::Caps, &CheckRule::with_action("delete"))
            .await
            .unwrap();
        // unknown name written by a newer/older deployment stays in storage
        store
            .hset("automod:rules:10", "holograms", "{}")
            .await
            .unwrap();

        let loaded = rules.load(10).await.unwrap();
        let kinds: Vec<_> = loaded.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![CheckKind::Spam, CheckKind::Caps]);
        assert_eq!(
            rules.enabled(10).await.unwrap(),
            vec!["spam", "caps", "holograms"]
        );
    }

    #[tokio::test]
    async fn re_enabling_overwrites_without_reordering() {
        let store = Arc::new(MemoryStore::new());
        let rules = RuleStore::new(store);
        rules
            .set_rule(10, CheckKind::Spam, &CheckRule::with_action("delete"))
            .await
            .unwrap();
        rules
            .set_rule(10, CheckKind::Caps, &CheckRule::with_action("delete"))
            .await
            .unwrap();
        rules
            .set_rule(10, CheckKind::Spam, &CheckRule::with_action("kick"))
            .await
            .unwrap();

        let loaded = rules.load(10).await.unwrap();
        assert_eq!(loaded[0].0, CheckKind::Spam);
        assert!(loaded[0].1.actions.contains_key("kick"));
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = Arc::new(MemoryStore::new());
        let rules = RuleStore::new(store);
        rules
            .set_rule(10, CheckKind::Spam, &CheckRule::with_action("delete"))
            .await
            .unwrap();
        rules.clear(10).await.unwrap();
        assert!(rules.enabled(10).await.unwrap().is_empty());
        assert!(rules.load(10).await.unwrap().is_empty());
    }
}
