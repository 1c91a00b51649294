//! Wire protocol message types for daemon IPC.
//!
//! All messages are MessagePack-encoded maps with at minimum `type` and
//! `id` fields. Requests carry a client-chosen `id` echoed in the
//! response; pushed `event` messages always use id 0.

use serde::{Deserialize, Serialize};

use crate::compositor::CompositorKind;
use crate::context::ContextSnapshot;

/// All wire protocol messages.
///
/// Serialized as a tagged union on the `type` field via MessagePack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Message {
    // -- Handshake --
    #[serde(rename = "hello")]
    Hello { id: u32, version: u32 },

    /// `version` is always the daemon's own protocol version.
    #[serde(rename = "hello_ack")]
    HelloAck {
        id: u32,
        version: u32,
        status: Status,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // -- Context tracker --
    #[serde(rename = "get_context")]
    GetContext { id: u32 },

    #[serde(rename = "record_launch")]
    RecordLaunch { id: u32, app_id: String },

    // -- Compositor state --
    #[serde(rename = "get_status")]
    GetStatus { id: u32 },

    // -- Event stream --
    #[serde(rename = "subscribe")]
    Subscribe { id: u32 },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { id: u32 },

    /// Unsolicited, daemon → subscribed client.
    #[serde(rename = "event")]
    Event { id: u32, name: String, data: String },

    // -- Generic response --
    #[serde(rename = "response")]
    Response {
        id: u32,
        status: Status,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<ContextSnapshot>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        compositor: Option<CompositorStatus>,
    },
}

/// Response status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Resolved compositor state returned by `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompositorStatus {
    pub kind: CompositorKind,
    pub label: String,
    pub workspace: String,
    pub workspace_id: i64,
    pub monitor: String,
    pub focused_screen: Option<String>,
    pub screens: Vec<ScreenStatus>,
    pub running_apps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenStatus {
    pub name: String,
    pub scale: f64,
    pub focused: bool,
}

pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum payload size (1 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Minimal envelope for extracting `{type, id}` from unknown messages.
///
/// Used as a fallback when [`Message`] deserialization fails so the
/// error response can echo the request id.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub id: u32,
}

impl Message {
    pub fn ok(id: u32) -> Self {
        Message::Response {
            id,
            status: Status::Ok,
            error: None,
            context: None,
            compositor: None,
        }
    }

    pub fn error(id: u32, reason: &str) -> Self {
        Message::Response {
            id,
            status: Status::Error,
            error: Some(reason.into()),
            context: None,
            compositor: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn round_trip(msg: &Message) -> Message {
        let encoded = rmp_serde::to_vec_named(msg).unwrap();
        rmp_serde::from_slice(&encoded).unwrap()
    }

    fn snapshot() -> ContextSnapshot {
        ContextSnapshot {
            hour: 9,
            day: 1,
            workspace: "web".into(),
            workspace_id: 4,
            monitor: "DP-1".into(),
            last_app: "firefox".into(),
            is_session_start: false,
            is_resume_from_idle: true,
            running_apps: BTreeSet::from(["firefox".to_string(), "kitty".to_string()]),
        }
    }

    #[test]
    fn context_response_round_trip() {
        let msg = Message::Response {
            id: 3,
            status: Status::Ok,
            error: None,
            context: Some(snapshot()),
            compositor: None,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn status_response_round_trip() {
        let msg = Message::Response {
            id: 4,
            status: Status::Ok,
            error: None,
            context: None,
            compositor: Some(CompositorStatus {
                kind: CompositorKind::Niri,
                label: "Niri".into(),
                workspace: "2".into(),
                workspace_id: 2,
                monitor: "eDP-1".into(),
                focused_screen: Some("eDP-1".into()),
                screens: vec![ScreenStatus {
                    name: "eDP-1".into(),
                    scale: 1.25,
                    focused: true,
                }],
                running_apps: vec!["foot".into()],
            }),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn unknown_workspace_id_survives_encoding() {
        let mut ctx = snapshot();
        ctx.workspace_id = -1;
        let msg = Message::Response {
            id: 1,
            status: Status::Ok,
            error: None,
            context: Some(ctx),
            compositor: None,
        };
        match round_trip(&msg) {
            Message::Response {
                context: Some(ctx), ..
            } => assert_eq!(ctx.workspace_id, -1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn type_tags_on_the_wire() {
        #[derive(Deserialize)]
        struct Tag {
            #[serde(rename = "type")]
            msg_type: String,
        }

        let cases = [
            (Message::GetContext { id: 1 }, "get_context"),
            (
                Message::RecordLaunch {
                    id: 2,
                    app_id: "firefox".into(),
                },
                "record_launch",
            ),
            (
                Message::Event {
                    id: 0,
                    name: "workspace".into(),
                    data: "3".into(),
                },
                "event",
            ),
        ];
        for (msg, tag) in cases {
            let encoded = rmp_serde::to_vec_named(&msg).unwrap();
            let decoded: Tag = rmp_serde::from_slice(&encoded).unwrap();
            assert_eq!(decoded.msg_type, tag);
        }
    }

    #[test]
    fn error_response_omits_empty_fields() {
        let encoded = rmp_serde::to_vec_named(&Message::error(9, "unknown_type")).unwrap();
        let value: std::collections::HashMap<String, serde::de::IgnoredAny> =
            rmp_serde::from_slice(&encoded).unwrap();
        assert!(value.contains_key("error"));
        assert!(!value.contains_key("context"));
        assert!(!value.contains_key("compositor"));
    }

    #[test]
    fn raw_envelope_extracts_unknown_type() {
        #[derive(Serialize)]
        struct Unknown {
            #[serde(rename = "type")]
            msg_type: &'static str,
            id: u32,
        }
        let encoded = rmp_serde::to_vec_named(&Unknown {
            msg_type: "reboot",
            id: 42,
        })
        .unwrap();
        assert!(rmp_serde::from_slice::<Message>(&encoded).is_err());
        let envelope: RawEnvelope = rmp_serde::from_slice(&encoded).unwrap();
        assert_eq!(envelope.msg_type, "reboot");
        assert_eq!(envelope.id, 42);
    }
}
