//! Server start and stop notices posted to the external platform.

use std::sync::{PoisonError, RwLock};

use crate::config::types::DiscordConfig;

#[derive(Debug, Default)]
struct Notices {
    started: String,
    stopped: String,
}

/// Start and stop notices; replaced when the configuration is reloaded.
#[derive(Debug, Default)]
pub struct ServerAnnouncements {
    notices: RwLock<Notices>,
}

impl ServerAnnouncements {
    pub fn from_config(config: &DiscordConfig) -> Self {
        let announcements = Self::default();
        announcements.replace(config);
        announcements
    }

    pub fn replace(&self, config: &DiscordConfig) {
        *self.notices.write().unwrap_or_else(PoisonError::into_inner) = Notices {
            started: config.server_started_message.trim().to_string(),
            stopped: config.server_stopped_message.trim().to_string(),
        };
    }

    /// Notice for the first Discord connection, `None` if blank.
    pub fn started(&self) -> Option<String> {
        let notices = self.notices.read().unwrap_or_else(PoisonError::into_inner);
        Some(notices.started.clone()).filter(|m| !m.is_empty())
    }

    /// Notice for shutdown, `None` if blank.
    pub fn stopped(&self) -> Option<String> {
        let notices = self.notices.read().unwrap_or_else(PoisonError::into_inner);
        Some(notices.stopped.clone()).filter(|m| !m.is_empty())
    }
}
