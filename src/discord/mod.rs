//! Discord bot integration.
//!
//! This module provides the Discord side of the bridge: the platform
//! client used for delivery and the inbound message handler.

pub mod client;
pub mod handler;
pub mod resolver;

// Re-export main types for external use
pub use client::{DiscordBot, DiscordPlatform, PlatformState};
pub use handler::InboundHandler;
