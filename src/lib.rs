//! Automated message-moderation engine for a chat-platform bot.
//!
//! For every inbound message the pipeline runs the guild's configured
//! battery of heuristic checks (link rate, caps, mention/emoji/attachment
//! flooding, repeated text, invite links, ...) against store-backed
//! time-bucketed counters, and enforces the first failure with the rule's
//! configured actions (delete, infraction, kick, ban, quarantine).
//!
//! The chat-platform transport, permission computation and UI are external
//! collaborators: the host feeds [`MessageFacts`] in, implements
//! [`GatewayActions`] for platform side effects, and consumes [`ModEvent`]s
//! from the event channel.

mod actions;
mod checks;
mod config;
mod counter;
mod dns;
mod message;
mod pipeline;
mod redis_store;
mod repeat;
mod rules;
mod snipe;
mod store;

pub use actions::{ActionDispatcher, ActionKind, GatewayActions, ModEvent};
pub use checks::{CheckContext, CheckFailure, CheckKind, CheckOutcome, CheckRegistry};
pub use config::EngineConfig;
pub use counter::{bucket_start, CounterKey, RateCounter};
pub use dns::{DnsResolver, TokioResolver};
pub use message::{Authority, InboundMessage, MessageFacts};
pub use pipeline::{AutoMod, CheckSelection, DryRunReport};
pub use redis_store::RedisStore;
pub use repeat::{count_occurrences, most_frequent_repeated_substring};
pub use rules::{bypassed, BypassEntry, CheckRule, RuleStore};
pub use snipe::{SnipeCache, SnipeEntry};
pub use store::{KvStore, MemoryStore, StoreError};
