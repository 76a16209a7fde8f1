//! Bridge channel management.
//!
//! Provides the channel structures shared between the router, the game
//! link and the shutdown sequence.

use std::sync::{PoisonError, RwLock};

use tokio::sync::{mpsc, watch};

use crate::common::error::{SendError, SendResult};
use crate::game::frames::OutboundFrame;

/// Outbound frames buffered per game connection.
pub const OUTBOX_CAPACITY: usize = 1024;

/// Route from delivery sinks to the currently connected game server.
///
/// The game link attaches a sender when the plugin connects and detaches it
/// when the connection ends. Sends while detached fail as unreachable.
#[derive(Debug, Default)]
pub struct GameOutbox {
    current: RwLock<Option<Attached>>,
}

#[derive(Debug)]
struct Attached {
    generation: u64,
    tx: mpsc::Sender<OutboundFrame>,
}

impl GameOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new connection, replacing any previous one.
    ///
    /// Returns the connection's generation, used to detach it later.
    pub fn attach(&self) -> (u64, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = current.as_ref().map_or(1, |a| a.generation + 1);
        *current = Some(Attached { generation, tx });
        (generation, rx)
    }

    /// Detach connection `generation` if it is still the current one.
    pub fn detach(&self, generation: u64) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|a| a.generation == generation) {
            *current = None;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub fn is_attached(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|a| !a.tx.is_closed())
    }

    /// Queue a frame for the game server.
    pub async fn send(&self, frame: OutboundFrame) -> SendResult<()> {
        let tx = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| a.tx.clone())
            .ok_or_else(|| SendError::ChannelUnreachable {
                message: "game server not connected".to_string(),
            })?;

        tx.send(frame).await.map_err(|_| SendError::ChannelUnreachable {
            message: "game connection closed".to_string(),
        })
    }
}

/// Control channels for shutdown coordination.
pub struct ControlChannels {
    /// Sender to trigger shutdown.
    pub shutdown_tx: watch::Sender<bool>,
    /// Receiver template; clone one per long-running task.
    pub shutdown_rx: watch::Receiver<bool>,
}

impl ControlChannels {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Signal every listener to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for ControlChannels {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::ChannelKind;

    fn frame(text: &str) -> OutboundFrame {
        OutboundFrame::Deliver {
            channel: ChannelKind::GameBroadcast,
            recipient: None,
            text: text.to_string(),
            blocked: false,
        }
    }

    #[tokio::test]
    async fn test_send_while_detached_is_unreachable() {
        let outbox = GameOutbox::new();
        assert!(!outbox.is_attached());
        let err = outbox.send(frame("hi")).await.unwrap_err();
        assert!(matches!(err, SendError::ChannelUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_attach_replaces_previous_connection() {
        let outbox = GameOutbox::new();
        let (first_gen, mut first) = outbox.attach();
        let (second_gen, mut second) = outbox.attach();
        assert_ne!(first_gen, second_gen);

        outbox.send(frame("hi")).await.unwrap();
        assert_eq!(second.recv().await, Some(frame("hi")));
        // First receiver's sender was dropped on replace
        assert_eq!(first.recv().await, None);

        // A stale connection cannot detach its replacement
        assert!(!outbox.detach(first_gen));
        assert!(outbox.is_attached());
        assert!(outbox.detach(second_gen));
        assert!(!outbox.is_attached());
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let control = ControlChannels::new();
        let mut rx = control.shutdown_rx.clone();
        control.shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
