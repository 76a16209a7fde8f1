//! Discord message event handling.
//!
//! Turns messages posted in the bridged Discord channel into
//! `ChatEvent{External}` and hands them to the router.

use std::sync::Arc;

use serenity::model::channel::Message;
use serenity::prelude::*;
use tracing::debug;

use crate::bridge::orchestrator::FanoutRouter;
use crate::common::messages::ChatEvent;
use crate::common::types::{Language, OriginKind, SenderIdentity};
use crate::discord::resolver::MessageResolver;

/// Inbound Discord message handler.
pub struct InboundHandler {
    router: Arc<FanoutRouter>,
    resolver: MessageResolver,
    channel_id: u64,
    language: Language,
}

impl InboundHandler {
    pub fn new(router: Arc<FanoutRouter>, channel_id: u64, language: Language) -> Self {
        Self {
            router,
            resolver: MessageResolver::new(),
            channel_id,
            language,
        }
    }

    /// Route one Discord message. Never waits on the fan-out.
    pub fn handle_message(&self, ctx: &Context, msg: &Message) {
        // Ignore our own messages
        if msg.author.id == ctx.cache.current_user().id {
            return;
        }

        // Ignore bots and anything outside the bridged guild channel
        if msg.author.bot || msg.guild_id.is_none() || msg.channel_id.get() != self.channel_id {
            return;
        }

        let content = with_attachments(
            msg.content.trim(),
            msg.attachments.iter().map(|a| a.url.as_str()),
        );
        if content.is_empty() {
            return;
        }

        // Effective display name
        let sender = msg
            .member
            .as_ref()
            .and_then(|m| m.nick.clone())
            .unwrap_or_else(|| msg.author.name.clone());

        let text = self.resolver.process_inbound(&content, &ctx.cache);
        debug!(sender = %sender, "Discord -> game: {}", text);

        let event = self.event_for(msg.author.id.get(), sender, text);
        // Fire and forget: the report is only useful to tests
        drop(self.router.route(event));
    }

    fn event_for(&self, author_id: u64, sender: String, text: String) -> ChatEvent {
        ChatEvent::new(
            OriginKind::External,
            SenderIdentity::new(format!("discord:{}", author_id), sender),
            text,
        )
        .with_language(self.language)
    }
}

/// Message content followed by attachment URLs, space separated.
fn with_attachments<'a>(content: &str, urls: impl Iterator<Item = &'a str>) -> String {
    let mut full_content = content.to_string();
    for url in urls {
        if !full_content.is_empty() {
            full_content.push(' ');
        }
        full_content.push_str(url);
    }
    full_content
}
