//! Discord markup resolution for inbound messages.
//!
//! Turns user, channel and role mentions into readable `@name`/`#name` text
//! and custom emoji into portable `:name:` shortcodes before a Discord
//! message enters the fan-out pipeline.

use fancy_regex::{Captures, Regex};
use serenity::cache::Cache;
use serenity::model::id::{ChannelId, RoleId, UserId};

/// Resolver for Discord -> game text.
#[derive(Debug, Clone)]
pub struct MessageResolver {
    /// Discord user mentions (<@123> or <@!123>).
    mention_pattern: Regex,
    /// Discord channel mentions (<#123>).
    channel_pattern: Regex,
    /// Discord role mentions (<@&123>).
    role_pattern: Regex,
    /// Discord custom emojis (<:name:id> or <a:name:id>).
    emoji_pattern: Regex,
}

impl Default for MessageResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageResolver {
    pub fn new() -> Self {
        Self {
            mention_pattern: Regex::new(r"<@!?(\d+)>").unwrap(),
            channel_pattern: Regex::new(r"<#(\d+)>").unwrap(),
            role_pattern: Regex::new(r"<@&(\d+)>").unwrap(),
            emoji_pattern: Regex::new(r"<a?:([a-zA-Z0-9_]+):\d+>").unwrap(),
        }
    }

    /// Convert Discord custom emojis to `:name:`.
    pub fn resolve_custom_emojis(&self, message: &str) -> String {
        self.emoji_pattern.replace_all(message, ":$1:").to_string()
    }

    /// Replace user mentions using `lookup(user_id)`; unknown ids are kept.
    pub fn resolve_mentions_with(&self, message: &str, lookup: impl Fn(u64) -> Option<String>) -> String {
        replace_ids(&self.mention_pattern, message, |id| lookup(id).map(|name| format!("@{}", name)))
    }

    /// Replace channel mentions using `lookup(channel_id)`.
    pub fn resolve_channels_with(&self, message: &str, lookup: impl Fn(u64) -> Option<String>) -> String {
        replace_ids(&self.channel_pattern, message, |id| lookup(id).map(|name| format!("#{}", name)))
    }

    /// Replace role mentions using `lookup(role_id)`.
    pub fn resolve_roles_with(&self, message: &str, lookup: impl Fn(u64) -> Option<String>) -> String {
        replace_ids(&self.role_pattern, message, |id| lookup(id).map(|name| format!("@{}", name)))
    }

    /// Full inbound pipeline against the serenity cache.
    pub fn process_inbound(&self, message: &str, cache: &Cache) -> String {
        let step1 = self.resolve_mentions_with(message, |id| {
            cache.user(UserId::new(id)).map(|user| user.name.clone())
        });
        let step2 = self.resolve_channels_with(&step1, |id| {
            let channel_id = ChannelId::new(id);
            cache.guilds().into_iter().find_map(|guild_id| {
                cache
                    .guild(guild_id)
                    .and_then(|guild| guild.channels.get(&channel_id).map(|c| c.name.clone()))
            })
        });
        let step3 = self.resolve_roles_with(&step2, |id| {
            let role_id = RoleId::new(id);
            cache.guilds().into_iter().find_map(|guild_id| {
                cache
                    .guild(guild_id)
                    .and_then(|guild| guild.roles.get(&role_id).map(|r| r.name.clone()))
            })
        });
        self.resolve_custom_emojis(&step3)
    }
}

fn replace_ids(pattern: &Regex, message: &str, resolve: impl Fn(u64) -> Option<String>) -> String {
    pattern
        .replace_all(message, |caps: &Captures| -> String {
            caps[1]
                .parse::<u64>()
                .ok()
                .and_then(&resolve)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string()
}
