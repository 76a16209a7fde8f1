//! Canonical message types for the fan-out pipeline.
//!
//! This module defines the single source of truth for messages flowing
//! from an origin (game, Discord, system) to delivery sinks.

use tokio::time::Instant;

use crate::common::types::{ChannelKind, Destination, Language, OriginKind, SenderIdentity};

/// An inbound chat message from exactly one origin. Immutable once created.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub origin: OriginKind,
    pub sender: SenderIdentity,
    pub raw_text: String,
    /// Source language, `None` means the server default.
    pub source_language: Option<Language>,
    /// Request embed rendering on the external platform (RGB color).
    pub embed_color: Option<u32>,
    pub timestamp: Instant,
}

impl ChatEvent {
    /// Create a new event stamped with the current monotonic time.
    pub fn new(origin: OriginKind, sender: SenderIdentity, raw_text: impl Into<String>) -> Self {
        Self {
            origin,
            sender,
            raw_text: raw_text.into(),
            source_language: None,
            embed_color: None,
            timestamp: Instant::now(),
        }
    }

    /// Set the source language.
    pub fn with_language(mut self, language: Language) -> Self {
        self.source_language = Some(language);
        self
    }

    /// Request embed rendering with the given color.
    pub fn with_embed_color(mut self, color: u32) -> Self {
        self.embed_color = Some(color);
        self
    }
}

/// A finished, channel-specific message ready for a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub destination: Destination,
    pub final_text: String,
    /// The content filter blocked the original (staff passthrough copy).
    pub blocked: bool,
    /// Origin of the event this was rendered from.
    pub origin: OriginKind,
    /// Sender display name, for embeds.
    pub author: String,
    pub embed_color: Option<u32>,
}

impl RenderedMessage {
    pub fn channel(&self) -> ChannelKind {
        self.destination.channel
    }
}
