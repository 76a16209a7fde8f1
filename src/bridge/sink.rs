//! Delivery sinks: the last hop of the fan-out pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::bridge::channels::GameOutbox;
use crate::common::error::{SendError, SendResult};
use crate::common::messages::RenderedMessage;
use crate::common::types::{ChannelKind, OriginKind};
use crate::config::types::DiscordConfig;
use crate::game::frames::OutboundFrame;

/// Performs the send of one rendered message.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, message: &RenderedMessage) -> SendResult<()>;
}

/// Narrow send interface of the external chat platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn send_text(&self, channel_id: u64, text: &str) -> SendResult<()>;

    async fn send_embed(&self, channel_id: u64, text: &str, author: &str, color: u32) -> SendResult<()>;

    /// Drop the current session and connect again.
    async fn reconnect(&self) -> anyhow::Result<()>;
}

/// Delivers to game channels through the game link.
pub struct GameChannelSink {
    outbox: Arc<GameOutbox>,
}

impl GameChannelSink {
    pub fn new(outbox: Arc<GameOutbox>) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl DeliverySink for GameChannelSink {
    async fn deliver(&self, message: &RenderedMessage) -> SendResult<()> {
        self.outbox
            .send(OutboundFrame::Deliver {
                channel: message.channel(),
                recipient: message.destination.recipient.clone(),
                text: message.final_text.clone(),
                blocked: message.blocked,
            })
            .await
    }
}

/// Discord channel ids per mirrored chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformChannels {
    pub chat: u64,
    pub staff: Option<u64>,
    pub premium: Option<u64>,
}

impl PlatformChannels {
    pub fn from_config(config: &DiscordConfig) -> Self {
        Self {
            chat: config.channel,
            staff: config.staff_channel,
            premium: config.premium_channel,
        }
    }

    /// Channel a message from `origin` is mirrored to.
    ///
    /// Staff and premium chat only go to their own channel; without one
    /// configured they are not mirrored.
    pub fn for_origin(&self, origin: OriginKind) -> Option<u64> {
        match origin {
            OriginKind::Staff => self.staff,
            OriginKind::Premium => self.premium,
            OriginKind::Player | OriginKind::System | OriginKind::External => Some(self.chat),
        }
    }
}

/// Delivers to the external platform.
///
/// An authentication failure marks the sink degraded; further sends are
/// skipped until [`ExternalPlatformSink::reconnect`] succeeds.
pub struct ExternalPlatformSink {
    client: Arc<dyn PlatformClient>,
    channels: PlatformChannels,
    degraded: AtomicBool,
}

impl ExternalPlatformSink {
    pub fn new(client: Arc<dyn PlatformClient>, channels: PlatformChannels) -> Self {
        Self {
            client,
            channels,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Reconnect the platform client and clear the degraded mark.
    pub async fn reconnect(&self) -> anyhow::Result<()> {
        self.client.reconnect().await?;
        self.degraded.store(false, Ordering::Release);
        info!("External platform reconnected");
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for ExternalPlatformSink {
    async fn deliver(&self, message: &RenderedMessage) -> SendResult<()> {
        if self.is_degraded() {
            return Err(SendError::AuthFailure);
        }

        let Some(channel_id) = self.channels.for_origin(message.origin) else {
            debug!(origin = message.origin.name(), "No platform channel configured, not mirrored");
            return Ok(());
        };

        let result = match message.embed_color {
            Some(color) => {
                self.client
                    .send_embed(channel_id, &message.final_text, &message.author, color)
                    .await
            }
            None => self.client.send_text(channel_id, &message.final_text).await,
        };

        if let Err(SendError::AuthFailure) = result {
            if !self.degraded.swap(true, Ordering::AcqRel) {
                error!("External platform rejected credentials, sends disabled until reconnect");
            }
        }
        result
    }
}

/// Routes each message to the sink for its channel kind.
pub struct SinkSet {
    pub game: Arc<dyn DeliverySink>,
    pub external: Arc<dyn DeliverySink>,
}

impl SinkSet {
    pub fn for_channel(&self, channel: ChannelKind) -> Arc<dyn DeliverySink> {
        if channel.is_game() {
            Arc::clone(&self.game)
        } else {
            Arc::clone(&self.external)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::MockPlatform;
    use crate::common::types::{Destination, RecipientId};

    fn rendered(origin: OriginKind, embed_color: Option<u32>) -> RenderedMessage {
        RenderedMessage {
            destination: Destination::channel(ChannelKind::ExternalPlatform),
            final_text: "hello".to_string(),
            blocked: false,
            origin,
            author: "Steve".to_string(),
            embed_color,
        }
    }

    fn channels() -> PlatformChannels {
        PlatformChannels {
            chat: 1,
            staff: Some(2),
            premium: None,
        }
    }

    #[tokio::test]
    async fn test_picks_channel_by_origin() {
        let platform = Arc::new(MockPlatform::new());
        let sink = ExternalPlatformSink::new(platform.clone(), channels());

        sink.deliver(&rendered(OriginKind::Player, None)).await.unwrap();
        sink.deliver(&rendered(OriginKind::Staff, None)).await.unwrap();
        sink.deliver(&rendered(OriginKind::Premium, None)).await.unwrap();

        assert_eq!(
            platform.sent(),
            vec![(1, "hello".to_string()), (2, "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_embed_when_color_set() {
        let platform = Arc::new(MockPlatform::new());
        let sink = ExternalPlatformSink::new(platform.clone(), channels());

        sink.deliver(&rendered(OriginKind::System, Some(0x00ff00))).await.unwrap();
        assert_eq!(platform.embeds(), vec![(1, "hello".to_string(), "Steve".to_string(), 0x00ff00)]);
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_degrades_until_reconnect() {
        let platform = Arc::new(MockPlatform::new());
        platform.fail_with(Some(SendError::AuthFailure));
        let sink = ExternalPlatformSink::new(platform.clone(), channels());

        assert_eq!(
            sink.deliver(&rendered(OriginKind::Player, None)).await,
            Err(SendError::AuthFailure)
        );
        assert!(sink.is_degraded());

        // Skipped without reaching the client
        platform.fail_with(None);
        assert_eq!(
            sink.deliver(&rendered(OriginKind::Player, None)).await,
            Err(SendError::AuthFailure)
        );
        assert!(platform.sent().is_empty());

        sink.reconnect().await.unwrap();
        assert!(!sink.is_degraded());
        sink.deliver(&rendered(OriginKind::Player, None)).await.unwrap();
        assert_eq!(platform.sent().len(), 1);
        assert_eq!(platform.reconnects(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_does_not_degrade() {
        let platform = Arc::new(MockPlatform::new());
        platform.fail_with(Some(SendError::RateLimited));
        let sink = ExternalPlatformSink::new(platform.clone(), channels());

        assert_eq!(
            sink.deliver(&rendered(OriginKind::Player, None)).await,
            Err(SendError::RateLimited)
        );
        assert!(!sink.is_degraded());
    }

    #[tokio::test]
    async fn test_game_sink_writes_deliver_frame() {
        let outbox = Arc::new(GameOutbox::new());
        let (_, mut rx) = outbox.attach();
        let sink = GameChannelSink::new(outbox);

        let message = RenderedMessage {
            destination: Destination::recipient(ChannelKind::GameBroadcast, RecipientId::new("u1")),
            final_text: "Steve: hola".to_string(),
            blocked: false,
            origin: OriginKind::Player,
            author: "Steve".to_string(),
            embed_color: None,
        };
        sink.deliver(&message).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(OutboundFrame::Deliver {
                channel: ChannelKind::GameBroadcast,
                recipient: Some(RecipientId::new("u1")),
                text: "Steve: hola".to_string(),
                blocked: false,
            })
        );
    }
}
