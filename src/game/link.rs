//! Game server link.
//!
//! The game server plugin connects over TCP and exchanges JSON lines with
//! the bridge: chat and roster events plus operator commands come in,
//! rendered deliveries and command results go out. One plugin connection
//! is served at a time; a new connection replaces the previous one.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bridge::admin::AdminCommands;
use crate::bridge::audience::Roster;
use crate::bridge::channels::GameOutbox;
use crate::bridge::orchestrator::FanoutRouter;
use crate::common::messages::ChatEvent;
use crate::common::types::{Language, SenderIdentity};
use crate::game::codec::new_link_connection;
use crate::game::frames::{InboundFrame, OutboundFrame};

/// Why a link connection loop ended.
#[derive(Debug, PartialEq, Eq)]
enum ConnectionEnd {
    /// Peer closed the stream.
    Closed,
    /// A newer connection took over the outbox.
    Replaced,
    /// Bridge is shutting down.
    Shutdown,
}

/// Serves the game server plugin.
#[derive(Clone)]
pub struct GameLink {
    router: Arc<FanoutRouter>,
    roster: Arc<Roster>,
    admin: Arc<AdminCommands>,
    outbox: Arc<GameOutbox>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GameLink {
    pub fn new(
        router: Arc<FanoutRouter>,
        roster: Arc<Roster>,
        admin: Arc<AdminCommands>,
        outbox: Arc<GameOutbox>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            router,
            roster,
            admin,
            outbox,
            shutdown_rx,
        }
    }

    /// Accept plugin connections on `bind` until shutdown.
    pub async fn run(self, bind: &str) -> Result<()> {
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("Failed to bind game link on {}", bind))?;
        info!("Game link listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            info!("Game server connected from {}", peer);
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!("Failed to set TCP_NODELAY: {}", e);
                            }
                            let link = self.clone();
                            tokio::spawn(async move {
                                match link.handle_connection(stream).await {
                                    Ok(end) => info!("Game server {} disconnected ({:?})", peer, end),
                                    Err(e) => error!("Game link error with {}: {:#}", peer, e),
                                }
                            });
                        }
                        Err(e) => warn!("Failed to accept game link connection: {}", e),
                    }
                }

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Game link stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Serve one plugin connection until it closes, is replaced or the
    /// bridge shuts down.
    async fn handle_connection<S>(&self, stream: S) -> Result<ConnectionEnd>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut connection = new_link_connection(stream);
        let (generation, mut outbound_rx) = self.outbox.attach();
        let mut shutdown_rx = self.shutdown_rx.clone();

        let result = loop {
            tokio::select! {
                frame = connection.next() => {
                    match frame {
                        Some(Ok(Ok(frame))) => {
                            if let Some(reply) = self.handle_frame(frame).await {
                                if let Err(e) = connection.send(reply).await {
                                    break Err(e.into());
                                }
                            }
                        }
                        Some(Ok(Err(e))) => warn!("Skipping game link frame: {}", e),
                        Some(Err(e)) => break Err(e.into()),
                        None => break Ok(ConnectionEnd::Closed),
                    }
                }

                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(frame) => {
                            if let Err(e) = connection.send(frame).await {
                                break Err(e.into());
                            }
                        }
                        None => break Ok(ConnectionEnd::Replaced),
                    }
                }

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break Ok(ConnectionEnd::Shutdown);
                    }
                }
            }
        };

        // A replaced connection leaves the roster to its successor
        if self.outbox.detach(generation) {
            self.roster.clear();
        }
        result
    }

    /// Apply one inbound frame. Commands produce a reply frame.
    async fn handle_frame(&self, frame: InboundFrame) -> Option<OutboundFrame> {
        match frame {
            InboundFrame::Chat {
                origin,
                sender_id,
                sender_name,
                text,
                language,
                embed_color,
            } => {
                let mut event = ChatEvent::new(origin, SenderIdentity::new(sender_id, sender_name), text);
                if let Some(code) = language {
                    match Language::parse(&code) {
                        Ok(language) => event = event.with_language(language),
                        Err(e) => warn!("{}; assuming the server default", e),
                    }
                }
                if let Some(color) = embed_color {
                    event = event.with_embed_color(color);
                }
                drop(self.router.route(event));
                None
            }
            InboundFrame::Join {
                id,
                name,
                staff,
                premium,
            } => {
                self.roster.join(id.clone(), name, staff, premium);
                debug!(recipient = %id, staff, premium, online = self.roster.len(), "Player joined");
                None
            }
            InboundFrame::Leave { id } => {
                match self.roster.leave(&id) {
                    Some(name) => debug!(recipient = %id, name = %name, online = self.roster.len(), "Player left"),
                    None => debug!(recipient = %id, "Leave for unknown player"),
                }
                None
            }
            InboundFrame::SetLanguage {
                request_id,
                recipient,
                language,
            } => {
                let result = self
                    .admin
                    .set_language_preference(&recipient, &language)
                    .await
                    .map(|language| format!("Language set to {}", language))
                    .map_err(|e| e.to_string());
                Some(OutboundFrame::command_result(request_id, result))
            }
            InboundFrame::ClearLanguage { request_id, recipient } => {
                let result = self
                    .admin
                    .clear_language_preference(&recipient)
                    .await
                    .map(|cleared| {
                        if cleared {
                            "Language preference cleared".to_string()
                        } else {
                            "No language preference set".to_string()
                        }
                    })
                    .map_err(|e| e.to_string());
                Some(OutboundFrame::command_result(request_id, result))
            }
            InboundFrame::GetLanguage { request_id, recipient } => {
                let (language, explicit) = self.admin.get_language_preference(&recipient);
                let message = if explicit {
                    format!("Language: {}", language)
                } else {
                    format!("Language: {} (default)", language)
                };
                Some(OutboundFrame::command_result(request_id, Ok(message)))
            }
            InboundFrame::ListLanguages { request_id } => {
                let entries = self.admin.list_language_preferences();
                let message = if entries.is_empty() {
                    "No language preferences set".to_string()
                } else {
                    entries
                        .iter()
                        .map(|(recipient, language)| format!("{}={}", recipient, language))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                Some(OutboundFrame::command_result(request_id, Ok(message)))
            }
            InboundFrame::TranslateMessage {
                request_id,
                recipient,
                text,
                language,
            } => {
                let result = self
                    .admin
                    .translate_message(&recipient, &text, language.as_deref())
                    .await
                    .map_err(|e| format!("{:#}", e));
                Some(OutboundFrame::command_result(request_id, result))
            }
            InboundFrame::ReloadFilter { request_id } => {
                let result = self
                    .admin
                    .reload_filter_list()
                    .map(|count| format!("Filter reloaded with {} entries", count))
                    .map_err(|e| format!("Filter reload failed: {}", e));
                Some(OutboundFrame::command_result(request_id, result))
            }
            InboundFrame::AddFilterTerm { request_id, term } => {
                let result = self
                    .admin
                    .add_filter_term(&term)
                    .map(|count| format!("Filter term added; {} entries", count))
                    .map_err(|e| e.to_string());
                Some(OutboundFrame::command_result(request_id, result))
            }
            InboundFrame::RemoveFilterTerm { request_id, term } => {
                let result = if self.admin.remove_filter_term(&term) {
                    Ok(format!("Filter term removed; {} entries", self.admin.filter_len()))
                } else {
                    Err(format!("Filter term not found: {}", term))
                };
                Some(OutboundFrame::command_result(request_id, result))
            }
            InboundFrame::ReloadConfig { request_id } => {
                let result = self
                    .admin
                    .reload_config()
                    .map(|count| format!("Configuration reloaded; filter has {} entries", count))
                    .map_err(|e| format!("Config reload failed: {:#}", e));
                Some(OutboundFrame::command_result(request_id, result))
            }
            InboundFrame::ReconnectPlatform { request_id } => {
                let result = self
                    .admin
                    .reconnect_platform()
                    .await
                    .map(|()| "Reconnecting to Discord".to_string())
                    .map_err(|e| e.to_string());
                Some(OutboundFrame::command_result(request_id, result))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio_util::task::TaskTracker;

    use super::*;
    use crate::bridge::admin::AdminParts;
    use crate::bridge::announce::ServerAnnouncements;
    use crate::bridge::audience::Audience;
    use crate::bridge::cache::{CacheSettings, TranslationCache};
    use crate::bridge::filter::ContentFilter;
    use crate::bridge::formatter::SharedFormats;
    use crate::bridge::orchestrator::RouterParts;
    use crate::bridge::preferences::{JsonFileBackend, LanguagePreferenceStore};
    use crate::bridge::sink::{GameChannelSink, PlatformChannels, SinkSet};
    use crate::bridge::testing::{MockEngine, RecordingSink};
    use crate::common::types::{ChannelKind, RecipientId};

    struct Harness {
        link: GameLink,
        roster: Arc<Roster>,
        shutdown_tx: watch::Sender<bool>,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let english = Language::parse("en").unwrap();
        let preferences = Arc::new(
            LanguagePreferenceStore::load(
                english,
                Box::new(JsonFileBackend::new(dir.path().join("languages.json"))),
            )
            .await
            .unwrap(),
        );
        let filter = Arc::new(ContentFilter::with_terms(["badword"]));
        let roster = Arc::new(Roster::new());
        let outbox = Arc::new(GameOutbox::new());
        let tasks = TaskTracker::new();
        let cache = Arc::new(TranslationCache::new(
            Arc::new(MockEngine::new()),
            CacheSettings {
                capacity: 64,
                call_timeout: Duration::from_secs(1),
            },
            tasks.clone(),
        ));

        let formats = Arc::new(SharedFormats::default());

        let router = Arc::new(FanoutRouter::new(RouterParts {
            filter: filter.clone(),
            cache: cache.clone(),
            preferences: preferences.clone(),
            audience: roster.clone() as Arc<dyn Audience>,
            formats: formats.clone(),
            sinks: SinkSet {
                game: Arc::new(GameChannelSink::new(outbox.clone())),
                external: Arc::new(RecordingSink::new()),
            },
            external_language: None,
            platform_channels: PlatformChannels {
                chat: 1,
                staff: None,
                premium: None,
            },
            tasks,
        }));
        let admin = Arc::new(AdminCommands::new(AdminParts {
            preferences,
            filter,
            cache,
            formats,
            announcements: Arc::new(ServerAnnouncements::default()),
            platform: None,
            config_path: None,
        }));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Harness {
            link: GameLink::new(router, roster.clone(), admin, outbox, shutdown_rx),
            roster,
            shutdown_tx,
            _dir: dir,
        }
    }

    struct Plugin {
        reader: BufReader<tokio::io::ReadHalf<DuplexStream>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
    }

    impl Plugin {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> OutboundFrame {
            let mut line = String::new();
            tokio::time::timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
                .await
                .expect("timed out waiting for a frame")
                .unwrap();
            serde_json::from_str(&line).unwrap()
        }
    }

    fn connect(link: &GameLink) -> (Plugin, JoinHandle<Result<ConnectionEnd>>) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let link = link.clone();
        let handle = tokio::spawn(async move { link.handle_connection(theirs).await });
        let (reader, writer) = tokio::io::split(ours);
        (
            Plugin {
                reader: BufReader::new(reader),
                writer,
            },
            handle,
        )
    }

    fn result(request_id: u64, ok: bool, message: &str) -> OutboundFrame {
        OutboundFrame::CommandResult {
            request_id,
            ok,
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_language_commands_round_trip() {
        let h = harness().await;
        let (mut plugin, _handle) = connect(&h.link);

        plugin
            .send(r#"{"type":"set_language","request_id":1,"recipient":"u1","language":"ES"}"#)
            .await;
        assert_eq!(plugin.recv().await, result(1, true, "Language set to es"));

        plugin.send(r#"{"type":"get_language","request_id":2,"recipient":"u1"}"#).await;
        assert_eq!(plugin.recv().await, result(2, true, "Language: es"));

        plugin.send(r#"{"type":"list_languages","request_id":3}"#).await;
        assert_eq!(plugin.recv().await, result(3, true, "u1=es"));

        plugin
            .send(r#"{"type":"set_language","request_id":4,"recipient":"u1","language":"klingon"}"#)
            .await;
        match plugin.recv().await {
            OutboundFrame::CommandResult { request_id, ok, .. } => {
                assert_eq!(request_id, 4);
                assert!(!ok);
            }
            other => panic!("unexpected frame {:?}", other),
        }

        plugin.send(r#"{"type":"clear_language","request_id":5,"recipient":"u1"}"#).await;
        assert_eq!(plugin.recv().await, result(5, true, "Language preference cleared"));

        plugin.send(r#"{"type":"get_language","request_id":6,"recipient":"u1"}"#).await;
        assert_eq!(plugin.recv().await, result(6, true, "Language: en (default)"));
    }

    #[tokio::test]
    async fn test_chat_is_delivered_per_recipient() {
        let h = harness().await;
        let (mut plugin, _handle) = connect(&h.link);

        plugin.send(r#"{"type":"join","id":"u1","name":"Steve"}"#).await;
        plugin
            .send(r#"{"type":"set_language","request_id":1,"recipient":"u1","language":"es"}"#)
            .await;
        assert_eq!(plugin.recv().await, result(1, true, "Language set to es"));

        plugin
            .send(r#"{"type":"chat","origin":"player","sender_id":"u2","sender_name":"Alex","text":"hello"}"#)
            .await;
        match plugin.recv().await {
            OutboundFrame::Deliver {
                channel,
                recipient,
                text,
                blocked,
            } => {
                assert_eq!(channel, ChannelKind::GameBroadcast);
                assert_eq!(recipient, Some(RecipientId::new("u1")));
                assert!(text.contains("[es] hello"), "got {}", text);
                assert!(!blocked);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_translate_message_command() {
        let h = harness().await;
        let (mut plugin, _handle) = connect(&h.link);

        plugin
            .send(r#"{"type":"set_language","request_id":1,"recipient":"u1","language":"de"}"#)
            .await;
        plugin.recv().await;

        plugin
            .send(r#"{"type":"translate_message","request_id":2,"recipient":"u1","text":"good game"}"#)
            .await;
        assert_eq!(plugin.recv().await, result(2, true, "[de] good game"));

        plugin
            .send(r#"{"type":"translate_message","request_id":3,"recipient":"u1","text":"hi","language":"zz"}"#)
            .await;
        match plugin.recv().await {
            OutboundFrame::CommandResult { request_id, ok, .. } => {
                assert_eq!(request_id, 3);
                assert!(!ok);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_filter_term_commands() {
        let h = harness().await;
        let (mut plugin, _handle) = connect(&h.link);

        plugin.send(r#"{"type":"add_filter_term","request_id":1,"term":"🍆"}"#).await;
        assert_eq!(plugin.recv().await, result(1, true, "Filter term added; 2 entries"));

        plugin.send(r#"{"type":"join","id":"u1","name":"Steve"}"#).await;
        plugin
            .send(r#"{"type":"chat","origin":"player","sender_id":"u2","sender_name":"Alex","text":"look 🍆"}"#)
            .await;
        plugin.send(r#"{"type":"remove_filter_term","request_id":2,"term":"badword"}"#).await;
        // A blocked player message reaches nobody, so the next frame is the reply
        assert_eq!(plugin.recv().await, result(2, true, "Filter term removed; 1 entries"));

        plugin.send(r#"{"type":"remove_filter_term","request_id":3,"term":"badword"}"#).await;
        assert_eq!(plugin.recv().await, result(3, false, "Filter term not found: badword"));
    }

    #[tokio::test]
    async fn test_reload_config_without_file_fails() {
        let h = harness().await;
        let (mut plugin, _handle) = connect(&h.link);

        plugin.send(r#"{"type":"reload_config","request_id":4}"#).await;
        assert_eq!(
            plugin.recv().await,
            result(4, false, "Config reload failed: No configuration file to reload")
        );
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let h = harness().await;
        let (mut plugin, handle) = connect(&h.link);

        plugin.send("{not json").await;
        plugin.send(r#"{"type":"get_language","request_id":9,"recipient":"u1"}"#).await;
        assert_eq!(plugin.recv().await, result(9, true, "Language: en (default)"));
        assert!(!handle.is_finished());
    }

    #[tokio::test]
    async fn test_reconnect_without_platform_fails() {
        let h = harness().await;
        let (mut plugin, _handle) = connect(&h.link);

        plugin.send(r#"{"type":"reconnect_platform","request_id":7}"#).await;
        match plugin.recv().await {
            OutboundFrame::CommandResult { request_id, ok, .. } => {
                assert_eq!(request_id, 7);
                assert!(!ok);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_clears_roster() {
        let h = harness().await;
        let (mut plugin, handle) = connect(&h.link);

        plugin.send(r#"{"type":"join","id":"u1","name":"Steve"}"#).await;
        plugin.send(r#"{"type":"list_languages","request_id":1}"#).await;
        plugin.recv().await;
        assert_eq!(h.roster.len(), 1);

        drop(plugin);
        assert_eq!(handle.await.unwrap().unwrap(), ConnectionEnd::Closed);
        assert_eq!(h.roster.len(), 0);
    }

    #[tokio::test]
    async fn test_new_connection_replaces_old() {
        let h = harness().await;
        let (mut first, first_handle) = connect(&h.link);
        first.send(r#"{"type":"join","id":"u1","name":"Steve"}"#).await;
        first.send(r#"{"type":"list_languages","request_id":1}"#).await;
        first.recv().await;

        let (mut second, _second_handle) = connect(&h.link);
        second.send(r#"{"type":"join","id":"u2","name":"Alex"}"#).await;
        second.send(r#"{"type":"list_languages","request_id":2}"#).await;
        second.recv().await;

        assert_eq!(first_handle.await.unwrap().unwrap(), ConnectionEnd::Replaced);
        // The replaced connection must not wipe its successor's roster
        assert_eq!(h.roster.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_ends_connection() {
        let h = harness().await;
        let (_plugin, handle) = connect(&h.link);
        tokio::task::yield_now().await;

        h.shutdown_tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), ConnectionEnd::Shutdown);
    }
}
