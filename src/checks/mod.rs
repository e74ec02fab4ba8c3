mod content;
mod frequency;

use crate::counter::{CounterKey, RateCounter};
use crate::dns::DnsResolver;
use crate::message::MessageFacts;
use crate::rules::CheckRule;
use crate::store::{KvStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The fixed catalog of checks. Stored rules refer to these by name;
/// unknown names in storage are ignored at evaluation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Links,
    Invites,
    Caps,
    Zalgo,
    Newlines,
    Mentions,
    Emojis,
    Spam,
    Images,
    RepeatedText,
}

impl CheckKind {
    pub const ALL: [CheckKind; 10] = [
        CheckKind::Links,
        CheckKind::Invites,
        CheckKind::Caps,
        CheckKind::Zalgo,
        CheckKind::Newlines,
        CheckKind::Mentions,
        CheckKind::Emojis,
        CheckKind::Spam,
        CheckKind::Images,
        CheckKind::RepeatedText,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CheckKind::Links => "links",
            CheckKind::Invites => "invites",
            CheckKind::Caps => "caps",
            CheckKind::Zalgo => "zalgo",
            CheckKind::Newlines => "newlines",
            CheckKind::Mentions => "mentions",
            CheckKind::Emojis => "emojis",
            CheckKind::Spam => "spam",
            CheckKind::Images => "images",
            CheckKind::RepeatedText => "repeated_text",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one predicate evaluation. Failing a check is expected control
/// flow, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail { reason: String },
}

/// A tripped check, as handed to the action dispatcher and reported by
/// dry runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckFailure {
    pub check: CheckKind,
    pub reason: String,
}

/// Everything a predicate may touch for one message: derived facts, the
/// counter layer, the raw store (for the repeated-text hash), DNS, and the
/// evaluation timestamp computed once per pipeline invocation.
pub struct CheckContext<'a> {
    pub facts: &'a MessageFacts,
    pub counters: &'a RateCounter,
    pub store: &'a Arc<dyn KvStore>,
    pub resolver: &'a dyn DnsResolver,
    pub now: u64,
    /// Dry-run evaluation: counter totals are projected, never committed.
    pub read_only: bool,
}

impl CheckContext<'_> {
    /// Add `amount` to the check's per-author counter and return the bucket
    /// total. With `amount == 0` or in read-only mode this degrades to a
    /// side-effect-free read (plus the uncommitted projection).
    pub(crate) async fn bump(
        &self,
        check: CheckKind,
        amount: i64,
        period: u64,
    ) -> Result<i64, StoreError> {
        let key = CounterKey {
            check: check.name(),
            guild_id: self.facts.guild_id,
            subject_id: Some(self.facts.author_id),
        };
        if self.read_only || amount == 0 {
            Ok(self.counters.current(&key, period, self.now).await? + amount)
        } else {
            self.counters.increment(&key, amount, period, self.now).await
        }
    }
}

/// Static mapping from check kind to predicate. One evaluation either
/// passes silently or reports the failure reason; store trouble surfaces as
/// `StoreError` for the pipeline's fail-open handling.
pub struct CheckRegistry;

impl CheckRegistry {
    pub async fn evaluate(
        kind: CheckKind,
        ctx: &CheckContext<'_>,
        rule: &CheckRule,
    ) -> Result<CheckOutcome, StoreError> {
        match kind {
            CheckKind::Links => frequency::links(ctx, rule).await,
            CheckKind::Invites => frequency::invites(ctx, rule).await,
            CheckKind::Caps => Ok(content::caps(ctx, rule)),
            CheckKind::Zalgo => Ok(content::zalgo(ctx, rule)),
            CheckKind::Newlines => frequency::newlines(ctx, rule).await,
            CheckKind::Mentions => frequency::mentions(ctx, rule).await,
            CheckKind::Emojis => frequency::emojis(ctx, rule).await,
            CheckKind::Spam => frequency::spam(ctx, rule).await,
            CheckKind::Images => frequency::images(ctx, rule).await,
            CheckKind::RepeatedText => content::repeated_text(ctx, rule).await,
        }
    }
}
