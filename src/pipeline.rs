use crate::actions::{ActionDispatcher, GatewayActions, ModEvent};
use crate::checks::{CheckContext, CheckFailure, CheckKind, CheckOutcome, CheckRegistry};
use crate::config::EngineConfig;
use crate::counter::RateCounter;
use crate::dns::{DnsResolver, TokioResolver};
use crate::message::MessageFacts;
use crate::rules::{bypassed, RuleStore};
use crate::snipe::{SnipeCache, SnipeEntry};
use crate::store::{KvStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Target of an administrative rule change: one check or the whole catalog.
#[derive(Clone, Copy, Debug)]
pub enum CheckSelection {
    One(CheckKind),
    All,
}

/// Outcome of evaluating every configured check without enforcement.
/// Bypassed and inconclusive checks count as passed.
#[derive(Debug, Default, Serialize)]
pub struct DryRunReport {
    pub passed: Vec<CheckKind>,
    pub failed: Vec<CheckFailure>,
}

/// The moderation pipeline: loads a guild's rules, runs bypass and check
/// evaluation in enable order, and enforces the first failure.
///
/// Everything infrastructural fails open: an unreachable store or a check
/// that cannot complete never blocks the message path.
pub struct AutoMod {
    store: Arc<dyn KvStore>,
    rules: RuleStore,
    counters: RateCounter,
    resolver: Arc<dyn DnsResolver>,
    dispatcher: ActionDispatcher,
    snipe: SnipeCache,
}

impl AutoMod {
    pub fn new(
        store: Arc<dyn KvStore>,
        gateway: Arc<dyn GatewayActions>,
        events: mpsc::UnboundedSender<ModEvent>,
        config: EngineConfig,
    ) -> Self {
        Self {
            rules: RuleStore::new(store.clone()),
            counters: RateCounter::new(store.clone()),
            resolver: Arc::new(TokioResolver::new(config.dns_timeout)),
            dispatcher: ActionDispatcher::new(gateway, events, config.action_timeout),
            snipe: SnipeCache::new(store.clone(), config.snipe_retention_secs),
            store,
        }
    }

    /// Swap the DNS resolver, e.g. for a caching resolver or a test stub.
    pub fn with_resolver(mut self, resolver: Arc<dyn DnsResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    fn context<'a>(&'a self, facts: &'a MessageFacts, now: u64, read_only: bool) -> CheckContext<'a> {
        CheckContext {
            facts,
            counters: &self.counters,
            store: &self.store,
            resolver: self.resolver.as_ref(),
            now,
            read_only,
        }
    }

    fn epoch_now() -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }

    /// Moderate one inbound message. Returns the failure that was enforced,
    /// if any.
    pub async fn process(&self, facts: &MessageFacts) -> Option<CheckFailure> {
        self.process_at(facts, Self::epoch_now()).await
    }

    /// [`process`](Self::process) with an explicit evaluation timestamp,
    /// for deterministic replay of past traffic.
    pub async fn process_at(&self, facts: &MessageFacts, now: u64) -> Option<CheckFailure> {
        if facts.author_is_bot {
            return None;
        }
        metrics::counter!("automod_messages_processed", 1);

        if let Err(e) = self.snipe.remember(facts).await {
            warn!(error = %e, "failed to cache message for snipe recall");
        }

        let rules = match self.rules.load(facts.guild_id).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(
                    guild_id = facts.guild_id,
                    error = %e,
                    "could not load rules, moderation skipped for this message"
                );
                return None;
            }
        };

        let ctx = self.context(facts, now, false);
        for (kind, rule) in &rules {
            if bypassed(&rule.bypass, facts) {
                debug!(check = %kind, author_id = facts.author_id, "check bypassed");
                continue;
            }
            match CheckRegistry::evaluate(*kind, &ctx, rule).await {
                Ok(CheckOutcome::Pass) => {}
                Ok(CheckOutcome::Fail { reason }) => {
                    let failure = CheckFailure {
                        check: *kind,
                        reason,
                    };
                    warn!(
                        check = %failure.check,
                        reason = %failure.reason,
                        guild_id = facts.guild_id,
                        author_id = facts.author_id,
                        content = %facts.content,
                        "check failed"
                    );
                    metrics::counter!("automod_check_failures", 1);
                    self.dispatcher.dispatch(&failure, rule, facts).await;
                    // at most one enforcement per message
                    return Some(failure);
                }
                Err(e) => {
                    // store trouble: inconclusive, fail open
                    warn!(check = %kind, error = %e, "check inconclusive, passing");
                }
            }
        }
        None
    }

    /// Evaluate every configured check without enforcement or counter
    /// mutation, reporting all failures instead of stopping at the first.
    pub async fn dry_run(&self, facts: &MessageFacts) -> DryRunReport {
        self.dry_run_at(facts, Self::epoch_now()).await
    }

    pub async fn dry_run_at(&self, facts: &MessageFacts, now: u64) -> DryRunReport {
        let mut report = DryRunReport::default();
        let rules = match self.rules.load(facts.guild_id).await {
            Ok(rules) => rules,
            Err(e) => {
                warn!(guild_id = facts.guild_id, error = %e, "could not load rules for dry run");
                return report;
            }
        };

        let ctx = self.context(facts, now, true);
        for (kind, rule) in &rules {
            if bypassed(&rule.bypass, facts) {
                report.passed.push(*kind);
                continue;
            }
            match CheckRegistry::evaluate(*kind, &ctx, rule).await {
                Ok(CheckOutcome::Pass) => report.passed.push(*kind),
                Ok(CheckOutcome::Fail { reason }) => report.failed.push(CheckFailure {
                    check: *kind,
                    reason,
                }),
                Err(e) => {
                    warn!(check = %kind, error = %e, "check inconclusive during dry run");
                    report.passed.push(*kind);
                }
            }
        }
        report
    }

    /// Administrative entry point: enable a check (or all of them) with a
    /// single action, or clear the guild's rules entirely when `enabled` is
    /// false. Returns the names now configured, in enable order.
    pub async fn set_check_rule(
        &self,
        guild_id: u64,
        selection: CheckSelection,
        action: &str,
        enabled: bool,
    ) -> Result<Vec<String>, StoreError> {
        if !enabled {
            self.rules.clear(guild_id).await?;
            return Ok(Vec::new());
        }
        let rule = crate::rules::CheckRule::with_action(action);
        match selection {
            CheckSelection::One(kind) => self.rules.set_rule(guild_id, kind, &rule).await?,
            CheckSelection::All => {
                for kind in CheckKind::ALL {
                    self.rules.set_rule(guild_id, kind, &rule).await?;
                }
            }
        }
        self.rules.enabled(guild_id).await
    }

    pub async fn clear_rules(&self, guild_id: u64) -> Result<(), StoreError> {
        self.rules.clear(guild_id).await
    }

    pub async fn enabled_checks(&self, guild_id: u64) -> Result<Vec<String>, StoreError> {
        self.rules.enabled(guild_id).await
    }

    /// Rule storage, for admin layers that need full rule bodies
    /// (custom parameters, bypass specs, action maps).
    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    /// Host hook for the platform's message-deleted notification; promotes
    /// the cached snapshot into the recall store.
    pub async fn message_deleted(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<bool, StoreError> {
        self.snipe.promote(channel_id, message_id).await
    }

    /// Recently deleted messages for a channel, newest first.
    pub async fn recall_deleted(
        &self,
        channel_id: u64,
        limit: usize,
    ) -> Result<Vec<SnipeEntry>, StoreError> {
        self.snipe.recall(channel_id, limit).await
    }
}
