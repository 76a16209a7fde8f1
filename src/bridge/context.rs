//! Startup wiring: builds every bridge component from the configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::bridge::admin::{AdminCommands, AdminParts};
use crate::bridge::announce::ServerAnnouncements;
use crate::bridge::audience::{Audience, Roster};
use crate::bridge::cache::{CacheSettings, TranslationCache};
use crate::bridge::channels::{ControlChannels, GameOutbox};
use crate::bridge::engine::{DisabledEngine, HttpTranslationEngine, TranslationEngine};
use crate::bridge::filter::ContentFilter;
use crate::bridge::formatter::{FormatSet, SharedFormats};
use crate::bridge::orchestrator::{FanoutRouter, RouterParts};
use crate::bridge::preferences::{JsonFileBackend, LanguagePreferenceStore};
use crate::bridge::sink::{ExternalPlatformSink, GameChannelSink, PlatformChannels, SinkSet};
use crate::common::types::Language;
use crate::config::types::Config;
use crate::discord::{DiscordBot, DiscordPlatform, InboundHandler};
use crate::game::link::GameLink;

/// The assembled bridge.
pub struct BridgeContext {
    pub config: Config,
    pub router: Arc<FanoutRouter>,
    pub roster: Arc<Roster>,
    pub admin: Arc<AdminCommands>,
    pub outbox: Arc<GameOutbox>,
    pub platform: Arc<DiscordPlatform>,
    pub external: Arc<ExternalPlatformSink>,
    pub control: ControlChannels,
    pub announcements: Arc<ServerAnnouncements>,
    /// Language of the Discord audience, `None` when Discord is disabled.
    pub external_language: Option<Language>,
}

impl BridgeContext {
    /// `config_path` is the file the admin reload command re-reads.
    pub async fn build(config: Config, config_path: Option<String>) -> Result<Self> {
        let default_language = Language::parse(&config.server.default_language)?;
        let external_language = if config.discord.enabled {
            match &config.discord.language {
                Some(code) => Some(Language::parse(code)?),
                None => Some(default_language),
            }
        } else {
            None
        };

        let engine: Arc<dyn TranslationEngine> = if config.translation.enabled {
            let engine = Arc::new(
                HttpTranslationEngine::new(&config.translation)
                    .context("Failed to create translation client")?,
            );
            engine.spawn_readiness_probe();
            engine
        } else {
            info!("Translation disabled; messages are delivered untranslated");
            Arc::new(DisabledEngine)
        };
        // Fan-outs and cache flights share one tracker so shutdown waits on both
        let tasks = TaskTracker::new();
        let cache = Arc::new(TranslationCache::new(
            engine,
            CacheSettings {
                capacity: config.translation.cache_capacity,
                call_timeout: Duration::from_secs(config.translation.timeout_secs),
            },
            tasks.clone(),
        ));

        let preferences = Arc::new(
            LanguagePreferenceStore::load(
                default_language,
                Box::new(JsonFileBackend::new(&config.preferences.path)),
            )
            .await
            .with_context(|| format!("Failed to load language preferences from {}", config.preferences.path))?,
        );
        let filter = Arc::new(ContentFilter::from_config(&config.filter));
        let roster = Arc::new(Roster::new());
        let outbox = Arc::new(GameOutbox::new());

        let formats = Arc::new(SharedFormats::new(FormatSet::from_config(&config.formats)));
        let announcements = Arc::new(ServerAnnouncements::from_config(&config.discord));

        let platform = Arc::new(DiscordPlatform::new());
        let platform_channels = PlatformChannels::from_config(&config.discord);
        let external = Arc::new(ExternalPlatformSink::new(platform.clone(), platform_channels));

        let router = Arc::new(FanoutRouter::new(RouterParts {
            filter: filter.clone(),
            cache: cache.clone(),
            preferences: preferences.clone(),
            audience: roster.clone() as Arc<dyn Audience>,
            formats: formats.clone(),
            sinks: SinkSet {
                game: Arc::new(GameChannelSink::new(outbox.clone())),
                external: external.clone(),
            },
            external_language,
            platform_channels,
            tasks,
        }));

        let admin = Arc::new(AdminCommands::new(AdminParts {
            preferences,
            filter,
            cache,
            formats,
            announcements: announcements.clone(),
            platform: config.discord.enabled.then(|| external.clone()),
            config_path,
        }));

        Ok(Self {
            config,
            router,
            roster,
            admin,
            outbox,
            platform,
            external,
            control: ControlChannels::new(),
            announcements,
            external_language,
        })
    }

    pub fn game_link(&self) -> GameLink {
        GameLink::new(
            self.router.clone(),
            self.roster.clone(),
            self.admin.clone(),
            self.outbox.clone(),
            self.control.shutdown_rx.clone(),
        )
    }

    /// The Discord bot, if Discord is enabled.
    pub fn discord_bot(&self) -> Option<DiscordBot> {
        let language = self.external_language?;
        let handler = InboundHandler::new(self.router.clone(), self.config.discord.channel, language);
        Some(DiscordBot::new(
            &self.config.discord,
            self.announcements.clone(),
            self.platform.clone(),
            handler,
            self.control.shutdown_rx.clone(),
        ))
    }
}
