//! Shared types used across the application.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::InvalidLanguage;
use crate::common::resources::canonical_language_code;

/// A validated language code from the known set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Language(&'static str);

impl Language {
    /// Validate and canonicalize a language code.
    pub fn parse(code: &str) -> Result<Self, InvalidLanguage> {
        canonical_language_code(code)
            .map(Language)
            .ok_or_else(|| InvalidLanguage {
                code: code.to_string(),
            })
    }

    pub fn code(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Opaque identity of a chat recipient (player UUID, Discord user id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub String);

impl RecipientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sent a message: opaque id plus display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub id: RecipientId,
    pub display_name: String,
}

impl SenderIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: RecipientId::new(id),
            display_name: display_name.into(),
        }
    }
}

/// Where a chat message started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    Player,
    Staff,
    Premium,
    System,
    External,
}

impl OriginKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Staff => "staff",
            Self::Premium => "premium",
            Self::System => "system",
            Self::External => "external",
        }
    }
}

/// A delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    GameBroadcast,
    StaffChannel,
    PremiumChannel,
    ExternalPlatform,
}

impl ChannelKind {
    /// Whether messages for this channel go to the game server.
    pub fn is_game(&self) -> bool {
        !matches!(self, Self::ExternalPlatform)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GameBroadcast => "game",
            Self::StaffChannel => "staff",
            Self::PremiumChannel => "premium",
            Self::ExternalPlatform => "external",
        }
    }
}

/// A rendering/delivery target, optionally for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination {
    pub channel: ChannelKind,
    pub recipient: Option<RecipientId>,
}

impl Destination {
    pub fn channel(channel: ChannelKind) -> Self {
        Self {
            channel,
            recipient: None,
        }
    }

    pub fn recipient(channel: ChannelKind, recipient: RecipientId) -> Self {
        Self {
            channel,
            recipient: Some(recipient),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.recipient {
            Some(recipient) => write!(f, "{}/{}", self.channel.name(), recipient),
            None => f.write_str(self.channel.name()),
        }
    }
}
