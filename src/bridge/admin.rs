//! Administrative commands, callable directly or through the game link.

use std::sync::Arc;

use anyhow::Context as _;
use tracing::{info, warn};

use crate::bridge::announce::ServerAnnouncements;
use crate::bridge::cache::TranslationCache;
use crate::bridge::emoji::EmojiNormalizer;
use crate::bridge::filter::ContentFilter;
use crate::bridge::formatter::{FormatSet, SharedFormats};
use crate::bridge::preferences::LanguagePreferenceStore;
use crate::bridge::sink::ExternalPlatformSink;
use crate::common::error::PreferenceError;
use crate::common::types::{ChannelKind, Language, RecipientId};
use crate::config::load_and_validate;

/// Shared components the commands operate on.
pub struct AdminParts {
    pub preferences: Arc<LanguagePreferenceStore>,
    pub filter: Arc<ContentFilter>,
    pub cache: Arc<TranslationCache>,
    pub formats: Arc<SharedFormats>,
    pub announcements: Arc<ServerAnnouncements>,
    /// `None` when the external platform is disabled.
    pub platform: Option<Arc<ExternalPlatformSink>>,
    /// Config file re-read by [`AdminCommands::reload_config`].
    pub config_path: Option<String>,
}

/// Operator-facing operations on the running bridge.
pub struct AdminCommands {
    preferences: Arc<LanguagePreferenceStore>,
    filter: Arc<ContentFilter>,
    cache: Arc<TranslationCache>,
    formats: Arc<SharedFormats>,
    announcements: Arc<ServerAnnouncements>,
    platform: Option<Arc<ExternalPlatformSink>>,
    config_path: Option<String>,
    emoji: EmojiNormalizer,
}

impl AdminCommands {
    pub fn new(parts: AdminParts) -> Self {
        Self {
            preferences: parts.preferences,
            filter: parts.filter,
            cache: parts.cache,
            formats: parts.formats,
            announcements: parts.announcements,
            platform: parts.platform,
            config_path: parts.config_path,
            emoji: EmojiNormalizer::new(),
        }
    }

    pub async fn set_language_preference(
        &self,
        recipient: &RecipientId,
        code: &str,
    ) -> Result<Language, PreferenceError> {
        let language = self.preferences.set(recipient, code).await?;
        info!(recipient = %recipient, language = %language, "Language preference updated");
        Ok(language)
    }

    pub async fn clear_language_preference(&self, recipient: &RecipientId) -> Result<bool, PreferenceError> {
        self.preferences.clear(recipient).await
    }

    /// Effective language and whether it was explicitly chosen.
    pub fn get_language_preference(&self, recipient: &RecipientId) -> (Language, bool) {
        match self.preferences.explicit(recipient) {
            Some(language) => (language, true),
            None => (self.preferences.default_language(), false),
        }
    }

    pub fn list_language_preferences(&self) -> Vec<(RecipientId, Language)> {
        self.preferences.all()
    }

    /// Translate `text` into the language `recipient` reads.
    ///
    /// `source` defaults to the server language. Goes through the shared
    /// cache, so a later chat message with the same text is a cache hit.
    pub async fn translate_message(
        &self,
        recipient: &RecipientId,
        text: &str,
        source: Option<&str>,
    ) -> anyhow::Result<String> {
        let source = match source {
            Some(code) => Language::parse(code)?,
            None => self.preferences.default_language(),
        };
        let target = self.preferences.get(recipient);
        let portable = self.emoji.to_portable(text);
        let translated = self
            .cache
            .translate(&portable, source, target)
            .await
            .with_context(|| format!("Translation {} -> {} failed", source, target))?;
        Ok(self.emoji.from_portable(&translated, ChannelKind::GameBroadcast))
    }

    /// Re-read the blocklist. Returns the number of active entries.
    pub fn reload_filter_list(&self) -> std::io::Result<usize> {
        match self.filter.reload() {
            Ok(count) => Ok(count),
            Err(e) => {
                warn!("Filter reload failed, keeping current list: {}", e);
                Err(e)
            }
        }
    }

    /// Block a term at runtime. Returns the number of active entries.
    pub fn add_filter_term(&self, term: &str) -> anyhow::Result<usize> {
        if term.trim().is_empty() {
            anyhow::bail!("Filter term must not be blank");
        }
        self.filter.add_term(term);
        info!(term, "Filter term added");
        Ok(self.filter.len())
    }

    /// Unblock a term. Returns whether it was in the list.
    pub fn remove_filter_term(&self, term: &str) -> bool {
        let removed = self.filter.remove_term(term);
        if removed {
            info!(term, "Filter term removed");
        }
        removed
    }

    /// Number of active filter entries.
    pub fn filter_len(&self) -> usize {
        self.filter.len()
    }

    /// Re-read the config file and apply the settings that can change
    /// while running: message formats, the content filter and the
    /// start/stop notices. Everything else needs a restart.
    ///
    /// An invalid file changes nothing. Returns the number of active
    /// filter entries.
    pub fn reload_config(&self) -> anyhow::Result<usize> {
        let Some(path) = self.config_path.as_deref() else {
            anyhow::bail!("No configuration file to reload");
        };
        let config = load_and_validate(path).with_context(|| format!("Failed to reload {}", path))?;

        let entries = self
            .filter
            .reconfigure(&config.filter)
            .context("Failed to read blocklist file")?;
        self.formats.replace(FormatSet::from_config(&config.formats));
        self.announcements.replace(&config.discord);

        info!("Configuration reloaded from {}", path);
        Ok(entries)
    }

    /// Reconnect the external platform and clear a degraded state.
    pub async fn reconnect_platform(&self) -> anyhow::Result<()> {
        match &self.platform {
            Some(platform) => platform.reconnect().await,
            None => anyhow::bail!("External platform is disabled"),
        }
    }
}
