//! Game link frame types.
//!
//! One JSON object per line, tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::common::types::{ChannelKind, OriginKind, RecipientId};

/// Frames sent by the game server plugin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Chat {
        origin: OriginKind,
        sender_id: String,
        sender_name: String,
        text: String,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        embed_color: Option<u32>,
    },
    Join {
        id: RecipientId,
        name: String,
        #[serde(default)]
        staff: bool,
        #[serde(default)]
        premium: bool,
    },
    Leave {
        id: RecipientId,
    },
    SetLanguage {
        request_id: u64,
        recipient: RecipientId,
        language: String,
    },
    ClearLanguage {
        request_id: u64,
        recipient: RecipientId,
    },
    GetLanguage {
        request_id: u64,
        recipient: RecipientId,
    },
    ListLanguages {
        request_id: u64,
    },
    /// Translate `text` into the language `recipient` reads.
    TranslateMessage {
        request_id: u64,
        recipient: RecipientId,
        text: String,
        /// Source language; the server default when absent.
        #[serde(default)]
        language: Option<String>,
    },
    ReloadFilter {
        request_id: u64,
    },
    AddFilterTerm {
        request_id: u64,
        term: String,
    },
    RemoveFilterTerm {
        request_id: u64,
        term: String,
    },
    ReloadConfig {
        request_id: u64,
    },
    ReconnectPlatform {
        request_id: u64,
    },
}

/// Frames sent to the game server plugin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Deliver {
        channel: ChannelKind,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        recipient: Option<RecipientId>,
        text: String,
        blocked: bool,
    },
    CommandResult {
        request_id: u64,
        ok: bool,
        message: String,
    },
}

impl OutboundFrame {
    pub fn command_result(request_id: u64, result: Result<String, String>) -> Self {
        match result {
            Ok(message) => Self::CommandResult {
                request_id,
                ok: true,
                message,
            },
            Err(message) => Self::CommandResult {
                request_id,
                ok: false,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_frame() {
        let line = r#"{"type":"chat","origin":"player","sender_id":"u1","sender_name":"Steve","text":"hello"}"#;
        let frame: InboundFrame = serde_json::from_str(line).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Chat {
                origin: OriginKind::Player,
                sender_id: "u1".to_string(),
                sender_name: "Steve".to_string(),
                text: "hello".to_string(),
                language: None,
                embed_color: None,
            }
        );
    }

    #[test]
    fn test_parse_join_defaults() {
        let frame: InboundFrame = serde_json::from_str(r#"{"type":"join","id":"u1","name":"Steve"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Join {
                id: RecipientId::new("u1"),
                name: "Steve".to_string(),
                staff: false,
                premium: false,
            }
        );
    }

    #[test]
    fn test_parse_translate_message_without_language() {
        let line = r#"{"type":"translate_message","request_id":3,"recipient":"u1","text":"hi"}"#;
        let frame: InboundFrame = serde_json::from_str(line).unwrap();
        assert_eq!(
            frame,
            InboundFrame::TranslateMessage {
                request_id: 3,
                recipient: RecipientId::new("u1"),
                text: "hi".to_string(),
                language: None,
            }
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<InboundFrame>(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn test_deliver_serialization() {
        let frame = OutboundFrame::Deliver {
            channel: ChannelKind::StaffChannel,
            recipient: Some(RecipientId::new("u2")),
            text: "[Staff] Mod: hi".to_string(),
            blocked: false,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(
            json,
            r#"{"type":"deliver","channel":"staff_channel","recipient":"u2","text":"[Staff] Mod: hi","blocked":false}"#
        );
    }

    #[test]
    fn test_command_result_from_outcome() {
        let frame = OutboundFrame::command_result(7, Err("Invalid language code: 'xx'".to_string()));
        assert!(matches!(frame, OutboundFrame::CommandResult { request_id: 7, ok: false, .. }));
    }
}
