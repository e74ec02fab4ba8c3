use crate::checks::CheckFailure;
use crate::message::MessageFacts;
use crate::rules::CheckRule;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The fixed set of enforcement effects a rule may configure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Delete,
    Infraction,
    Kick,
    Ban,
    Quarantine,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Delete,
        ActionKind::Infraction,
        ActionKind::Kick,
        ActionKind::Ban,
        ActionKind::Quarantine,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Delete => "delete",
            ActionKind::Infraction => "infraction",
            ActionKind::Kick => "kick",
            ActionKind::Ban => "ban",
            ActionKind::Quarantine => "quarantine",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

/// Fire-and-forget notifications consumed by sibling subsystems
/// (moderation history, quarantine). No response contract.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ModEvent {
    Infraction {
        guild_id: u64,
        user_id: u64,
        weight: i64,
    },
    Quarantine {
        guild_id: u64,
        user_id: u64,
        data: Value,
    },
}

/// Platform side effects, implemented by the hosting bot's transport layer.
#[async_trait]
pub trait GatewayActions: Send + Sync {
    async fn delete_message(&self, guild_id: u64, channel_id: u64, message_id: u64) -> Result<()>;
    /// Short-lived reply telling the channel which check tripped.
    async fn send_warning(&self, channel_id: u64, check: &str, reason: &str) -> Result<()>;
    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<()>;
    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<()>;
}

/// Executes a failing rule's configured actions. All platform effects for
/// one failure run concurrently under a single timeout; each failure is
/// logged and isolated so one broken action cannot suppress the rest.
pub struct ActionDispatcher {
    gateway: Arc<dyn GatewayActions>,
    events: mpsc::UnboundedSender<ModEvent>,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(
        gateway: Arc<dyn GatewayActions>,
        events: mpsc::UnboundedSender<ModEvent>,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            events,
            timeout,
        }
    }

    fn publish(&self, event: ModEvent) {
        if self.events.send(event).is_err() {
            debug!("mod event receiver dropped, discarding event");
        }
    }

    pub async fn dispatch(&self, failure: &CheckFailure, rule: &CheckRule, facts: &MessageFacts) {
        let mut effects: Vec<(ActionKind, BoxFuture<'static, Result<()>>)> = Vec::new();
        let authority = &facts.bot_authority;
        let audit_reason = format!("Automod check [{}]: {}", failure.check, failure.reason);

        for (name, params) in &rule.actions {
            let Some(kind) = ActionKind::from_name(name) else {
                warn!(action = %name, "unknown action configured, skipping");
                continue;
            };
            match kind {
                ActionKind::Delete => {
                    if authority.manage_messages {
                        let gw = self.gateway.clone();
                        let (g, c, m) = (facts.guild_id, facts.channel_id, facts.message_id);
                        effects.push((kind, async move { gw.delete_message(g, c, m).await }.boxed()));
                    } else {
                        debug!(guild_id = facts.guild_id, "missing manage_messages, delete skipped");
                    }
                    if authority.send_messages {
                        let gw = self.gateway.clone();
                        let channel = facts.channel_id;
                        let check = failure.check.name();
                        let reason = failure.reason.clone();
                        effects.push((
                            kind,
                            async move { gw.send_warning(channel, check, &reason).await }.boxed(),
                        ));
                    }
                }
                ActionKind::Infraction => {
                    let weight = params
                        .get("infractions")
                        .and_then(Value::as_i64)
                        .unwrap_or(1);
                    self.publish(ModEvent::Infraction {
                        guild_id: facts.guild_id,
                        user_id: facts.author_id,
                        weight,
                    });
                }
                ActionKind::Kick => {
                    if authority.kick_members && authority.rank > facts.author_rank {
                        let gw = self.gateway.clone();
                        let (g, u) = (facts.guild_id, facts.author_id);
                        let reason = audit_reason.clone();
                        effects.push((kind, async move { gw.kick(g, u, &reason).await }.boxed()));
                    } else {
                        debug!(
                            guild_id = facts.guild_id,
                            user_id = facts.author_id,
                            "insufficient authority, kick skipped"
                        );
                    }
                }
                ActionKind::Ban => {
                    if authority.ban_members && authority.rank > facts.author_rank {
                        let gw = self.gateway.clone();
                        let (g, u) = (facts.guild_id, facts.author_id);
                        let reason = audit_reason.clone();
                        effects.push((kind, async move { gw.ban(g, u, &reason).await }.boxed()));
                    } else {
                        debug!(
                            guild_id = facts.guild_id,
                            user_id = facts.author_id,
                            "insufficient authority, ban skipped"
                        );
                    }
                }
                ActionKind::Quarantine => {
                    self.publish(ModEvent::Quarantine {
                        guild_id: facts.guild_id,
                        user_id: facts.author_id,
                        data: json!({
                            "check": failure.check,
                            "reason": failure.reason,
                            "config": params,
                        }),
                    });
                }
            }
        }

        if effects.is_empty() {
            return;
        }

        metrics::counter!("automod_actions_dispatched", effects.len() as u64);
        let (kinds, futures): (Vec<_>, Vec<_>) = effects.into_iter().unzip();
        match tokio::time::timeout(self.timeout, join_all(futures)).await {
            Ok(results) => {
                for (kind, result) in kinds.iter().zip(results) {
                    if let Err(e) = result {
                        warn!(action = kind.name(), error = %e, "action failed");
                    }
                }
            }
            Err(_) => warn!(
                timeout_secs = self.timeout.as_secs(),
                "action dispatch timed out"
            ),
        }
    }
}
