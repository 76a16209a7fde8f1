//! Message formatting for display.
//!
//! Handles placeholder substitution in message format strings.
//! Supports placeholders: %time, %user, %message, %origin

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Local;

use crate::common::types::{ChannelKind, OriginKind};
use crate::config::types::FormatsConfig;

/// Message formatter that substitutes placeholders in format strings.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    format: String,
}

impl MessageFormatter {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    /// Format a message with the given context.
    ///
    /// Substitutes the following placeholders:
    /// - `%time` - Current local time (HH:MM:SS)
    /// - `%user` - Sender display name
    /// - `%message` - The (translated) message text
    /// - `%origin` - Origin kind (`player`, `staff`, ...)
    ///
    /// Substitution is a single pass over the format string, so placeholder
    /// text inside a name or message is emitted literally. A `%` that starts
    /// no known placeholder is kept as is.
    pub fn format(&self, ctx: &FormatContext) -> String {
        let mut out = String::with_capacity(self.format.len() + ctx.user.len() + ctx.message.len());
        let mut rest = self.format.as_str();

        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            let (value, token_len) = if tail.starts_with("%time") {
                (get_time(), "%time".len())
            } else if tail.starts_with("%user") {
                (ctx.user.clone(), "%user".len())
            } else if tail.starts_with("%message") {
                (ctx.message.clone(), "%message".len())
            } else if tail.starts_with("%origin") {
                (ctx.origin.name().to_string(), "%origin".len())
            } else {
                ("%".to_string(), 1)
            };
            out.push_str(&value);
            rest = &tail[token_len..];
        }
        out.push_str(rest);
        out
    }
}

/// Context for message formatting.
#[derive(Debug, Clone)]
pub struct FormatContext {
    pub user: String,
    pub message: String,
    pub origin: OriginKind,
}

impl FormatContext {
    pub fn new(origin: OriginKind, user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            message: message.into(),
            origin,
        }
    }
}

/// The configured formatters, one per (origin, channel) shape.
#[derive(Debug, Clone)]
pub struct FormatSet {
    game: MessageFormatter,
    external_to_game: MessageFormatter,
    system: MessageFormatter,
    staff: MessageFormatter,
    premium: MessageFormatter,
    discord: MessageFormatter,
}

impl FormatSet {
    pub fn from_config(config: &FormatsConfig) -> Self {
        Self {
            game: MessageFormatter::new(&config.game),
            external_to_game: MessageFormatter::new(&config.external_to_game),
            system: MessageFormatter::new(&config.system),
            staff: MessageFormatter::new(&config.staff),
            premium: MessageFormatter::new(&config.premium),
            discord: MessageFormatter::new(&config.discord),
        }
    }

    /// Pick the formatter for a message from `origin` delivered to `channel`.
    pub fn select(&self, origin: OriginKind, channel: ChannelKind) -> &MessageFormatter {
        match (origin, channel) {
            (OriginKind::System, _) => &self.system,
            (_, ChannelKind::ExternalPlatform) => &self.discord,
            (_, ChannelKind::StaffChannel) => &self.staff,
            (_, ChannelKind::PremiumChannel) => &self.premium,
            (OriginKind::External, ChannelKind::GameBroadcast) => &self.external_to_game,
            (_, ChannelKind::GameBroadcast) => &self.game,
        }
    }

    /// Render `text` for `channel`.
    pub fn render(&self, origin: OriginKind, channel: ChannelKind, user: &str, text: &str) -> String {
        self.select(origin, channel)
            .format(&FormatContext::new(origin, user, text))
    }
}

impl Default for FormatSet {
    fn default() -> Self {
        Self::from_config(&FormatsConfig::default())
    }
}

/// The active format set, replaceable while messages are being rendered.
#[derive(Debug, Default)]
pub struct SharedFormats {
    current: RwLock<Arc<FormatSet>>,
}

impl SharedFormats {
    pub fn new(formats: FormatSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(formats)),
        }
    }

    pub fn current(&self) -> Arc<FormatSet> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, formats: FormatSet) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(formats);
    }
}

/// Get the current time as HH:MM:SS string.
fn get_time() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_format() {
        let formatter = MessageFormatter::new("[%user]: %message");
        let ctx = FormatContext::new(OriginKind::Player, "Steve", "Hello world!");

        assert_eq!(formatter.format(&ctx), "[Steve]: Hello world!");
    }

    #[test]
    fn test_format_with_time() {
        let formatter = MessageFormatter::new("[%time] %user: %message");
        let ctx = FormatContext::new(OriginKind::Player, "Steve", "Test");
        let result = formatter.format(&ctx);

        assert!(result.contains("Steve: Test"));
        assert!(result.starts_with('['));
        // "[HH:MM:SS] " prefix
        assert_eq!(result.find(']'), Some(9));
    }

    #[test]
    fn test_message_placeholders_not_expanded() {
        let formatter = MessageFormatter::new("%user: %message");
        let ctx = FormatContext::new(OriginKind::Player, "Steve", "I typed %user and %time");

        assert_eq!(formatter.format(&ctx), "Steve: I typed %user and %time");
    }

    #[test]
    fn test_user_placeholders_not_expanded() {
        let formats = FormatSet::default();
        assert_eq!(
            formats.render(OriginKind::External, ChannelKind::GameBroadcast, "%message", "hi"),
            "[Discord] %message: hi"
        );

        let formatter = MessageFormatter::new("%user (%origin): %message");
        let ctx = FormatContext::new(OriginKind::Player, "%origin%time", "50% off");
        assert_eq!(formatter.format(&ctx), "%origin%time (player): 50% off");
    }

    #[test]
    fn test_unknown_percent_kept() {
        let formatter = MessageFormatter::new("100% %user%: %message %");
        let ctx = FormatContext::new(OriginKind::Player, "Steve", "hi");
        assert_eq!(formatter.format(&ctx), "100% Steve%: hi %");
    }

    #[test]
    fn test_origin_placeholder() {
        let formatter = MessageFormatter::new("(%origin) %user: %message");
        let ctx = FormatContext::new(OriginKind::Premium, "Alex", "hi");
        assert_eq!(formatter.format(&ctx), "(premium) Alex: hi");
    }

    #[test]
    fn test_format_selection() {
        let formats = FormatSet::default();
        assert_eq!(
            formats.render(OriginKind::External, ChannelKind::GameBroadcast, "Bob", "hi"),
            "[Discord] Bob: hi"
        );
        assert_eq!(
            formats.render(OriginKind::Player, ChannelKind::GameBroadcast, "Steve", "hi"),
            "Steve: hi"
        );
        assert_eq!(
            formats.render(OriginKind::Staff, ChannelKind::StaffChannel, "Mod", "hi"),
            "[Staff] Mod: hi"
        );
        assert_eq!(
            formats.render(OriginKind::Player, ChannelKind::ExternalPlatform, "Steve", "hi"),
            "**Steve**: hi"
        );
        assert_eq!(
            formats.render(OriginKind::System, ChannelKind::ExternalPlatform, "Server", "Server started"),
            "Server started"
        );
    }

    #[test]
    fn test_shared_formats_replace() {
        let shared = SharedFormats::default();
        let before = shared.current();

        let mut config = FormatsConfig::default();
        config.game = "<%user> %message".to_string();
        shared.replace(FormatSet::from_config(&config));

        assert_eq!(
            before.render(OriginKind::Player, ChannelKind::GameBroadcast, "Steve", "hi"),
            "Steve: hi"
        );
        assert_eq!(
            shared
                .current()
                .render(OriginKind::Player, ChannelKind::GameBroadcast, "Steve", "hi"),
            "<Steve> hi"
        );
    }
}
