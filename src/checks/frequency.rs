//! Counter-backed checks: each one folds the message's counted quantity
//! into the subject's bucket for the configured window and trips on the
//! resulting total. Links and invites trip at `total >= amount`; the rest
//! at `total > amount`, matching their different default semantics
//! (one link is already too many, five mentions are still fine).

use super::{CheckContext, CheckKind, CheckOutcome};
use crate::rules::CheckRule;
use crate::store::StoreError;
use tracing::debug;

pub(super) async fn links(
    ctx: &CheckContext<'_>,
    rule: &CheckRule,
) -> Result<CheckOutcome, StoreError> {
    let amount = rule.amount(1);
    let per = rule.per(5);

    let domains = ctx.facts.domains();
    if domains.is_empty() {
        return Ok(CheckOutcome::Pass);
    }

    let mut resolved = 0i64;
    let mut last_domain = "";
    for domain in &domains {
        if ctx.resolver.resolves(domain).await {
            resolved += 1;
            last_domain = domain.as_str();
        } else {
            debug!(domain = %domain, "unresolvable domain not counted");
        }
    }
    if resolved == 0 {
        return Ok(CheckOutcome::Pass);
    }

    let total = ctx.bump(CheckKind::Links, resolved, per).await?;
    if total >= amount {
        Ok(CheckOutcome::Fail {
            reason: format!("Link detected ({})", last_domain),
        })
    } else {
        Ok(CheckOutcome::Pass)
    }
}

pub(super) async fn invites(
    ctx: &CheckContext<'_>,
    rule: &CheckRule,
) -> Result<CheckOutcome, StoreError> {
    let amount = rule.amount(1);
    let per = rule.per(5);

    let count = ctx.facts.distinct_invites().len() as i64;
    if count == 0 {
        return Ok(CheckOutcome::Pass);
    }

    let total = ctx.bump(CheckKind::Invites, count, per).await?;
    if total >= amount {
        Ok(CheckOutcome::Fail {
            reason: "Invite detected".to_string(),
        })
    } else {
        Ok(CheckOutcome::Pass)
    }
}

pub(super) async fn newlines(
    ctx: &CheckContext<'_>,
    rule: &CheckRule,
) -> Result<CheckOutcome, StoreError> {
    let amount = rule.amount(15);
    let per = rule.per(3);

    let count = ctx.facts.stripped.matches('\n').count() as i64;
    let total = ctx.bump(CheckKind::Newlines, count, per).await?;
    if total > amount {
        Ok(CheckOutcome::Fail {
            reason: format!("Too many newlines ({}/{}s)", total, per),
        })
    } else {
        Ok(CheckOutcome::Pass)
    }
}

pub(super) async fn mentions(
    ctx: &CheckContext<'_>,
    rule: &CheckRule,
) -> Result<CheckOutcome, StoreError> {
    if ctx.facts.mention_count == 0 {
        return Ok(CheckOutcome::Pass);
    }
    let amount = rule.amount(5);
    let per = rule.per(5);

    let total = ctx
        .bump(CheckKind::Mentions, ctx.facts.mention_count as i64, per)
        .await?;
    if total > amount {
        Ok(CheckOutcome::Fail {
            reason: format!("Too many mentions [{}]", total),
        })
    } else {
        Ok(CheckOutcome::Pass)
    }
}

pub(super) async fn emojis(
    ctx: &CheckContext<'_>,
    rule: &CheckRule,
) -> Result<CheckOutcome, StoreError> {
    if ctx.facts.emoji_count == 0 {
        return Ok(CheckOutcome::Pass);
    }
    let amount = rule.amount(7);
    let per = rule.per(5);

    let total = ctx
        .bump(CheckKind::Emojis, ctx.facts.emoji_count as i64, per)
        .await?;
    if total > amount {
        Ok(CheckOutcome::Fail {
            reason: format!("Too many emojis [{}]", total),
        })
    } else {
        Ok(CheckOutcome::Pass)
    }
}

/// Pure rate limit: one unit per message, content-agnostic.
pub(super) async fn spam(
    ctx: &CheckContext<'_>,
    rule: &CheckRule,
) -> Result<CheckOutcome, StoreError> {
    let amount = rule.amount(5);
    let per = rule.per(3);

    let total = ctx.bump(CheckKind::Spam, 1, per).await?;
    if total > amount {
        Ok(CheckOutcome::Fail {
            reason: format!("Sending messages too quickly ({}/{}s)", total, per),
        })
    } else {
        Ok(CheckOutcome::Pass)
    }
}

pub(super) async fn images(
    ctx: &CheckContext<'_>,
    rule: &CheckRule,
) -> Result<CheckOutcome, StoreError> {
    if ctx.facts.attachment_count == 0 {
        return Ok(CheckOutcome::Pass);
    }
    let amount = rule.amount(3);
    let per = rule.per(8);

    let total = ctx
        .bump(CheckKind::Images, ctx.facts.attachment_count as i64, per)
        .await?;
    if total > amount {
        Ok(CheckOutcome::Fail {
            reason: format!("Sending images too quickly ({}/{}s)", total, per),
        })
    } else {
        Ok(CheckOutcome::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::RateCounter;
    use crate::dns::DnsResolver;
    use crate::message::{Authority, InboundMessage, MessageFacts};
    use crate::store::{KvStore, MemoryStore};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Arc;

    struct FixedResolver {
        resolvable: HashSet<String>,
    }

    #[async_trait]
    impl DnsResolver for FixedResolver {
        async fn resolves(&self, domain: &str) -> bool {
            self.resolvable.contains(domain)
        }
    }

    struct Fixture {
        store: Arc<dyn KvStore>,
        counters: RateCounter,
        resolver: FixedResolver,
    }

    impl Fixture {
        fn new(resolvable: &[&str]) -> Self {
            let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
            Self {
                counters: RateCounter::new(store.clone()),
                store,
                resolver: FixedResolver {
                    resolvable: resolvable.iter().map(|s| s.to_string()).collect(),
                },
            }
        }

        fn ctx<'a>(&'a self, facts: &'a MessageFacts, now: u64) -> CheckContext<'a> {
            CheckContext {
                facts,
                counters: &self.counters,
                store: &self.store,
                resolver: &self.resolver,
                now,
                read_only: false,
            }
        }
    }

    fn message(content: &str, attachments: u32, mentions: u32) -> MessageFacts {
        MessageFacts::derive(InboundMessage {
            guild_id: 1,
            channel_id: 2,
            message_id: 3,
            author_id: 4,
            author_name: "sender".into(),
            author_is_bot: false,
            author_roles: vec![],
            author_permissions: HashSet::new(),
            author_rank: 0,
            bot_authority: Authority::default(),
            content: content.into(),
            attachment_count: attachments,
            mention_count: mentions,
        })
    }

    #[tokio::test]
    async fn spam_trips_above_threshold_not_at_it() {
        let fx = Fixture::new(&[]);
        let facts = message("hi", 0, 0);
        let rule = CheckRule::from_json(r#"{"amount": 2, "per": 3, "actions": {"delete": true}}"#);

        // messages 1 and 2 pass, message 3 exceeds amount
        for _ in 0..2 {
            let out = spam(&fx.ctx(&facts, 100), &rule).await.unwrap();
            assert_eq!(out, CheckOutcome::Pass);
        }
        let out = spam(&fx.ctx(&facts, 101), &rule).await.unwrap();
        match out {
            CheckOutcome::Fail { reason } => assert!(reason.contains("3/3s"), "{reason}"),
            CheckOutcome::Pass => panic!("third message should trip"),
        }
    }

    #[tokio::test]
    async fn spam_resets_in_next_bucket() {
        let fx = Fixture::new(&[]);
        let facts = message("hi", 0, 0);
        let rule = CheckRule::from_json(r#"{"amount": 1, "per": 3, "actions": {}}"#);

        assert_eq!(spam(&fx.ctx(&facts, 99), &rule).await.unwrap(), CheckOutcome::Pass);
        // 99 and 102 are in different aligned 3s windows
        assert_eq!(spam(&fx.ctx(&facts, 102), &rule).await.unwrap(), CheckOutcome::Pass);
    }

    #[tokio::test]
    async fn single_resolvable_link_trips_default() {
        let fx = Fixture::new(&["example.com"]);
        let facts = message("go to https://example.com/page", 0, 0);
        let rule = CheckRule::default();
        match links(&fx.ctx(&facts, 100), &rule).await.unwrap() {
            CheckOutcome::Fail { reason } => assert!(reason.contains("example.com")),
            CheckOutcome::Pass => panic!("resolvable link should trip amount=1"),
        }
    }

    #[tokio::test]
    async fn unresolvable_domains_are_not_counted() {
        let fx = Fixture::new(&[]);
        let facts = message("see fake.invalid.example or nosuch.com", 0, 0);
        let rule = CheckRule::default();
        assert_eq!(
            links(&fx.ctx(&facts, 100), &rule).await.unwrap(),
            CheckOutcome::Pass
        );
    }

    #[tokio::test]
    async fn invite_trips_on_pattern_without_dns() {
        let fx = Fixture::new(&[]);
        let facts = message("join discord.gg/abcdef", 0, 0);
        let rule = CheckRule::default();
        assert!(matches!(
            invites(&fx.ctx(&facts, 100), &rule).await.unwrap(),
            CheckOutcome::Fail { .. }
        ));
    }

    #[tokio::test]
    async fn mentions_accumulate_within_window() {
        let fx = Fixture::new(&[]);
        let facts = message("hey @a @b @c", 0, 3);
        let rule = CheckRule::default();

        assert_eq!(
            mentions(&fx.ctx(&facts, 100), &rule).await.unwrap(),
            CheckOutcome::Pass
        );
        // second burst in the same window pushes the total to 6 > 5
        match mentions(&fx.ctx(&facts, 101), &rule).await.unwrap() {
            CheckOutcome::Fail { reason } => assert!(reason.contains("[6]")),
            CheckOutcome::Pass => panic!("6 mentions within window should trip"),
        }
    }

    #[tokio::test]
    async fn images_ignore_textonly_messages() {
        let fx = Fixture::new(&[]);
        let facts = message("words", 0, 0);
        assert_eq!(
            images(&fx.ctx(&facts, 100), &CheckRule::default())
                .await
                .unwrap(),
            CheckOutcome::Pass
        );
        let heavy = message("pics", 4, 0);
        assert!(matches!(
            images(&fx.ctx(&heavy, 100), &CheckRule::default())
                .await
                .unwrap(),
            CheckOutcome::Fail { .. }
        ));
    }

    #[tokio::test]
    async fn emoji_flood_trips() {
        let fx = Fixture::new(&[]);
        let facts = message("\u{1F600}\u{1F600}\u{1F600}\u{1F600}\u{1F600}\u{1F600}\u{1F600}\u{1F600}", 0, 0);
        match emojis(&fx.ctx(&facts, 100), &CheckRule::default())
            .await
            .unwrap()
        {
            CheckOutcome::Fail { reason } => assert!(reason.contains("[8]")),
            CheckOutcome::Pass => panic!("8 emoji should exceed default 7"),
        }
    }

    #[tokio::test]
    async fn read_only_projects_without_committing() {
        let fx = Fixture::new(&[]);
        let facts = message("hi", 0, 0);
        let rule = CheckRule::from_json(r#"{"amount": 1, "per": 3, "actions": {}}"#);

        let mut ctx = fx.ctx(&facts, 100);
        ctx.read_only = true;
        // evaluating twice keeps projecting 1, since nothing is committed
        assert_eq!(spam(&ctx, &rule).await.unwrap(), CheckOutcome::Pass);
        assert_eq!(spam(&ctx, &rule).await.unwrap(), CheckOutcome::Pass);
    }
}
