//! Discord bot client.
//!
//! [`DiscordPlatform`] is the send side used by the external delivery sink;
//! [`DiscordBot`] owns the gateway connection, reconnects with backoff and
//! feeds inbound messages to the [`InboundHandler`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use backon::BackoffBuilder;
use serenity::all::{CreateEmbed, CreateEmbedAuthor, CreateMessage, ShardManager};
use serenity::http::{Http, HttpBuilder, HttpError};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use serenity::Client;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::bridge::announce::ServerAnnouncements;
use crate::bridge::sink::PlatformClient;
use crate::common::error::{SendError, SendResult};
use crate::config::types::DiscordConfig;
use crate::discord::handler::InboundHandler;

/// Discord session state.
#[derive(Clone, Default)]
pub enum PlatformState {
    #[default]
    Disconnected,
    Connecting,
    Connected(Arc<Http>),
}

impl PlatformState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected(_) => "connected",
        }
    }
}

/// Send side of the Discord connection.
pub struct DiscordPlatform {
    state: RwLock<PlatformState>,
    shard_manager: RwLock<Option<Arc<ShardManager>>>,
    reconnect_requested: AtomicBool,
}

impl DiscordPlatform {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PlatformState::Disconnected),
            shard_manager: RwLock::new(None),
            reconnect_requested: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> PlatformState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_state(&self, state: PlatformState) {
        debug!("Discord state: {}", state.name());
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn session(&self) -> SendResult<Arc<Http>> {
        match self.state() {
            PlatformState::Connected(http) => Ok(http),
            other => Err(SendError::ChannelUnreachable {
                message: format!("Discord {}", other.name()),
            }),
        }
    }

    fn take_reconnect_request(&self) -> bool {
        self.reconnect_requested.swap(false, Ordering::AcqRel)
    }
}

impl Default for DiscordPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformClient for DiscordPlatform {
    async fn send_text(&self, channel_id: u64, text: &str) -> SendResult<()> {
        let http = self.session()?;
        ChannelId::new(channel_id)
            .say(&http, text)
            .await
            .map(|_| ())
            .map_err(map_serenity_error)
    }

    async fn send_embed(&self, channel_id: u64, text: &str, author: &str, color: u32) -> SendResult<()> {
        let http = self.session()?;
        let embed = CreateEmbed::new()
            .author(CreateEmbedAuthor::new(author))
            .description(text)
            .color(color);
        ChannelId::new(channel_id)
            .send_message(&http, CreateMessage::new().embed(embed))
            .await
            .map(|_| ())
            .map_err(map_serenity_error)
    }

    async fn reconnect(&self) -> anyhow::Result<()> {
        let manager = self
            .shard_manager
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(manager) = manager else {
            anyhow::bail!("Discord client is not running");
        };

        info!("Reconnecting to Discord on operator request");
        self.reconnect_requested.store(true, Ordering::Release);
        self.set_state(PlatformState::Connecting);
        manager.shutdown_all().await;
        Ok(())
    }
}

/// Map a serenity error onto the delivery error taxonomy.
fn map_serenity_error(error: serenity::Error) -> SendError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(ref response)) = error {
        match response.status_code.as_u16() {
            401 | 403 => return SendError::AuthFailure,
            429 => return SendError::RateLimited,
            _ => {}
        }
    }
    SendError::ChannelUnreachable {
        message: error.to_string(),
    }
}

#[derive(Debug, Clone)]
pub enum DiscordBotEvent {
    /// Bot connected and ready.
    Ready { context: Context, ready: Ready },
    /// Message received.
    Message { context: Context, message: Message },
}

struct DiscordBotEvents {
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
}

#[async_trait]
impl EventHandler for DiscordBotEvents {
    async fn ready(&self, context: Context, ready: Ready) {
        if let Err(error) = self.discord_events_tx.send(DiscordBotEvent::Ready { context, ready }) {
            warn!("Failed to process discord event: {}", error);
        }
    }

    async fn message(&self, context: Context, message: Message) {
        if let Err(error) = self.discord_events_tx.send(DiscordBotEvent::Message { context, message }) {
            warn!("Failed to process discord event: {}", error);
        }
    }
}

async fn build_client(token: &str, discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>) -> anyhow::Result<Client> {
    let intents = GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT | GatewayIntents::GUILDS;

    // Build a custom reqwest client with timeout settings
    let reqwest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let http = HttpBuilder::new(token).client(reqwest_client).build();

    let events = DiscordBotEvents { discord_events_tx };
    let client = serenity::client::ClientBuilder::new_with_http(http, intents)
        .event_handler(events)
        .await?;
    Ok(client)
}

/// Exponential backoff for Discord reconnection.
/// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
fn discord_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(5))
        .with_max_delay(Duration::from_secs(300))
        .with_factor(1.1)
        .with_jitter()
        .without_max_times()
        .build()
}

/// Owns the gateway connection.
pub struct DiscordBot {
    token: String,
    chat_channel: u64,
    announcements: Arc<ServerAnnouncements>,
    platform: Arc<DiscordPlatform>,
    handler: InboundHandler,
    shutdown_rx: watch::Receiver<bool>,
}

impl DiscordBot {
    pub fn new(
        config: &DiscordConfig,
        announcements: Arc<ServerAnnouncements>,
        platform: Arc<DiscordPlatform>,
        handler: InboundHandler,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            token: config.token.clone(),
            chat_channel: config.channel,
            announcements,
            platform,
            handler,
            shutdown_rx,
        }
    }

    pub async fn run(self) {
        let DiscordBot {
            token,
            chat_channel,
            announcements,
            platform,
            handler,
            mut shutdown_rx,
        } = self;
        let (discord_events_tx, mut discord_events_rx) = mpsc::unbounded_channel::<DiscordBotEvent>();

        tokio::select! {
            _ = run_connection(&token, &platform, &discord_events_tx) => {},
            _ = process_events(&mut discord_events_rx, &platform, &handler, chat_channel, &announcements) => {},
            _ = async {
                loop {
                    if shutdown_rx.changed().await.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                let manager = platform.shard_manager.read().unwrap_or_else(PoisonError::into_inner).clone();
                if let Some(manager) = manager {
                    info!("Initiating graceful Discord shutdown...");
                    manager.shutdown_all().await;
                    info!("Discord shutdown complete");
                }
            } => {}
        }
        platform.set_state(PlatformState::Disconnected);
        info!("Discord task ended");
    }
}

async fn process_events(
    discord_events_rx: &mut mpsc::UnboundedReceiver<DiscordBotEvent>,
    platform: &DiscordPlatform,
    handler: &InboundHandler,
    chat_channel: u64,
    announcements: &ServerAnnouncements,
) {
    let mut announced = false;
    while let Some(event) = discord_events_rx.recv().await {
        match event {
            DiscordBotEvent::Ready { context, ready } => {
                info!("Discord bot connected as {}", ready.user.name);
                platform.set_state(PlatformState::Connected(context.http.clone()));

                // Announce once per process, not on every reconnect
                if !announced {
                    announced = true;
                    if let Some(message) = announcements.started() {
                        if let Err(e) = platform.send_text(chat_channel, &message).await {
                            warn!("Failed to announce server start: {}", e);
                        }
                    }
                }
            }
            DiscordBotEvent::Message { context, message } => {
                handler.handle_message(&context, &message);
            }
        }
    }
    debug!("Discord events channel closed.");
}

async fn run_connection(
    token: &str,
    platform: &DiscordPlatform,
    discord_events_tx: &mpsc::UnboundedSender<DiscordBotEvent>,
) {
    let mut backoff = discord_backoff();

    loop {
        info!("Connecting to Discord...");
        platform.set_state(PlatformState::Connecting);

        let mut client = match build_client(token, discord_events_tx.clone()).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to build Discord client: {}", e);
                let delay = backoff.next().unwrap_or(Duration::from_secs(300));
                warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                sleep(delay).await;
                continue;
            }
        };
        *platform.shard_manager.write().unwrap_or_else(PoisonError::into_inner) =
            Some(client.shard_manager.clone());

        let result = client.start().await;
        platform.set_state(PlatformState::Disconnected);

        match result {
            Ok(()) if platform.take_reconnect_request() => {
                backoff = discord_backoff();
                continue;
            }
            Ok(()) => {
                info!("Discord client disconnected normally");
                break;
            }
            Err(e) => {
                error!("Discord client error: {}", e);
                let delay = backoff.next().unwrap_or(Duration::from_secs(300));
                warn!(
                    "Discord disconnected. Reconnecting in {:.1}s...",
                    delay.as_secs_f64(),
                );
                sleep(delay).await;
            }
        }
    }
}
