//! Who is online in the game and which channels they read.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::common::types::{ChannelKind, RecipientId};

/// Resolves the readers of a game channel.
pub trait Audience: Send + Sync {
    /// Connected recipients that can read `channel`, in a stable order.
    fn recipients(&self, channel: ChannelKind) -> Vec<RecipientId>;
}

#[derive(Debug, Clone)]
struct Member {
    name: String,
    staff: bool,
    premium: bool,
}

impl Member {
    fn reads(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::GameBroadcast => true,
            ChannelKind::StaffChannel => self.staff,
            ChannelKind::PremiumChannel => self.premium,
            ChannelKind::ExternalPlatform => false,
        }
    }
}

/// Online players, kept current by the game link's join/leave frames.
#[derive(Debug, Default)]
pub struct Roster {
    members: RwLock<HashMap<RecipientId, Member>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update a member.
    pub fn join(&self, id: RecipientId, name: impl Into<String>, staff: bool, premium: bool) {
        self.members.write().unwrap_or_else(PoisonError::into_inner).insert(
            id,
            Member {
                name: name.into(),
                staff,
                premium,
            },
        );
    }

    /// Remove a member. Returns their display name if they were online.
    pub fn leave(&self, id: &RecipientId) -> Option<String> {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .map(|m| m.name)
    }

    /// Forget everyone, e.g. when the game server disconnects.
    pub fn clear(&self) {
        self.members.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.members.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Audience for Roster {
    fn recipients(&self, channel: ChannelKind) -> Vec<RecipientId> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<RecipientId> = members
            .iter()
            .filter(|(_, member)| member.reads(channel))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> RecipientId {
        RecipientId::new(s)
    }

    #[test]
    fn test_channel_membership() {
        let roster = Roster::new();
        roster.join(id("p1"), "Steve", false, false);
        roster.join(id("s1"), "Mod", true, false);
        roster.join(id("v1"), "Vip", false, true);

        assert_eq!(roster.recipients(ChannelKind::GameBroadcast), vec![id("p1"), id("s1"), id("v1")]);
        assert_eq!(roster.recipients(ChannelKind::StaffChannel), vec![id("s1")]);
        assert_eq!(roster.recipients(ChannelKind::PremiumChannel), vec![id("v1")]);
        assert!(roster.recipients(ChannelKind::ExternalPlatform).is_empty());
    }

    #[test]
    fn test_join_updates_and_leave_removes() {
        let roster = Roster::new();
        roster.join(id("p1"), "Steve", false, false);
        roster.join(id("p1"), "Steve", true, false);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.recipients(ChannelKind::StaffChannel), vec![id("p1")]);

        assert_eq!(roster.leave(&id("p1")).as_deref(), Some("Steve"));
        assert!(roster.leave(&id("p1")).is_none());
        assert!(roster.recipients(ChannelKind::GameBroadcast).is_empty());
    }
}
