use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

// Scheme URLs plus bare domains on common TLDs. Domain extraction and DNS
// validation happen in the links check; this only has to over-approximate.
static LINK_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bhttps?://[^\s<>]+|\b[a-z0-9][a-z0-9.-]*\.(?:com|net|org|edu|gov|io|gg|me|co|dev|xyz|app|info|biz|tv|ly|sh|to|cc)\b(?:/[^\s<>]*)?",
    )
    .unwrap()
});

static INVITE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:https?://)?(?:www\.)?(?:discord\.(?:gg|io|me|li)|discordapp\.com/invite)/[^\s/]+",
    )
    .unwrap()
});

// Platform custom emoji tags: <a:name:id> for animated, <:name:id> otherwise
static CUSTOM_EMOJI_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<a?:[A-Za-z0-9_]{2,32}:[0-9]{17,22}>").unwrap());

/// Unicode emoji detection over the common emoji blocks.
fn is_unicode_emoji(c: char) -> bool {
    let code = c as u32;
    (0x1F600..=0x1F64F).contains(&code) // emoticons
        || (0x1F300..=0x1F5FF).contains(&code) // misc symbols and pictographs
        || (0x1F680..=0x1F6FF).contains(&code) // transport
        || (0x1F900..=0x1F9FF).contains(&code) // supplemental symbols
        || (0x2600..=0x26FF).contains(&code) // misc symbols
        || (0x2700..=0x27BF).contains(&code) // dingbats
}

/// Permission and hierarchy snapshot for the acting bot in the message's
/// guild/channel. Supplied by the host, which owns permission computation.
#[derive(Clone, Debug, Default)]
pub struct Authority {
    pub manage_messages: bool,
    pub send_messages: bool,
    pub kick_members: bool,
    pub ban_members: bool,
    /// Position of the bot's highest role; kick/ban require this to strictly
    /// exceed the subject's rank.
    pub rank: i64,
}

/// One inbound message as delivered by the host transport, before fact
/// extraction. Mention and attachment counts come pre-resolved because the
/// platform object model is external to this crate.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    pub author_roles: Vec<u64>,
    /// Names of permission flags the author holds in the channel.
    pub author_permissions: HashSet<String>,
    pub author_rank: i64,
    pub bot_authority: Authority,
    pub content: String,
    pub attachment_count: u32,
    pub mention_count: u32,
}

/// Facts derived from one inbound message, owned by a single pipeline
/// invocation. Never persisted beyond the rate counters it feeds.
#[derive(Clone, Debug)]
pub struct MessageFacts {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    pub author_roles: Vec<u64>,
    pub author_permissions: HashSet<String>,
    pub author_rank: i64,
    pub bot_authority: Authority,
    pub content: String,
    /// Content with surrounding whitespace trimmed.
    pub stripped: String,
    pub attachment_count: u32,
    pub mention_count: u32,
    pub links: Vec<String>,
    pub invites: Vec<String>,
    pub emoji_count: u32,
}

impl MessageFacts {
    pub fn derive(msg: InboundMessage) -> Self {
        let links = LINK_REGEX
            .find_iter(&msg.content)
            .map(|m| m.as_str().to_string())
            .collect();
        let invites = INVITE_REGEX
            .find_iter(&msg.content)
            .map(|m| m.as_str().to_string())
            .collect();
        let emoji_count = CUSTOM_EMOJI_REGEX.find_iter(&msg.content).count() as u32
            + msg.content.chars().filter(|c| is_unicode_emoji(*c)).count() as u32;
        let stripped = msg.content.trim().to_string();

        Self {
            guild_id: msg.guild_id,
            channel_id: msg.channel_id,
            message_id: msg.message_id,
            author_id: msg.author_id,
            author_name: msg.author_name,
            author_is_bot: msg.author_is_bot,
            author_roles: msg.author_roles,
            author_permissions: msg.author_permissions,
            author_rank: msg.author_rank,
            bot_authority: msg.bot_authority,
            content: msg.content,
            stripped,
            attachment_count: msg.attachment_count,
            mention_count: msg.mention_count,
            links,
            invites,
            emoji_count,
        }
    }

    /// Distinct domains referenced by the message's links, in first-seen
    /// order. Scheme, path and port are stripped.
    pub fn domains(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for link in &self.links {
            let rest = link
                .strip_prefix("https://")
                .or_else(|| link.strip_prefix("http://"))
                .unwrap_or(link);
            let host = rest.split('/').next().unwrap_or(rest);
            let host = host.split(':').next().unwrap_or(host).to_lowercase();
            if !host.is_empty() && seen.insert(host.clone()) {
                out.push(host);
            }
        }
        out
    }

    /// Distinct invite URLs, preserving first-seen order.
    pub fn distinct_invites(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.invites
            .iter()
            .map(String::as_str)
            .filter(|i| seen.insert(*i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(content: &str) -> InboundMessage {
        InboundMessage {
            guild_id: 1,
            channel_id: 2,
            message_id: 3,
            author_id: 4,
            author_name: "tester".into(),
            author_is_bot: false,
            author_roles: vec![],
            author_permissions: HashSet::new(),
            author_rank: 0,
            bot_authority: Authority::default(),
            content: content.into(),
            attachment_count: 0,
            mention_count: 0,
        }
    }

    #[test]
    fn extracts_scheme_urls_and_bare_domains() {
        let facts = MessageFacts::derive(inbound(
            "see https://example.com/page and also spam.net plus http://example.com/other",
        ));
        assert_eq!(facts.links.len(), 3);
        // domains dedupe across scheme/path variants
        assert_eq!(facts.domains(), vec!["example.com", "spam.net"]);
    }

    #[test]
    fn extracts_invites() {
        let facts = MessageFacts::derive(inbound(
            "join discord.gg/abc or https://discordapp.com/invite/xyz",
        ));
        assert_eq!(facts.invites.len(), 2);
        assert_eq!(facts.distinct_invites().len(), 2);
    }

    #[test]
    fn counts_custom_and_unicode_emoji() {
        let facts =
            MessageFacts::derive(inbound("hi <:wave:123456789012345678> \u{1F600}\u{1F680}"));
        assert_eq!(facts.emoji_count, 3);
    }

    #[test]
    fn plain_text_has_no_facts() {
        let facts = MessageFacts::derive(inbound("  just words here  "));
        assert!(facts.links.is_empty());
        assert!(facts.invites.is_empty());
        assert_eq!(facts.emoji_count, 0);
        assert_eq!(facts.stripped, "just words here");
    }
}
