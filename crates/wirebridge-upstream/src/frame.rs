// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text frame codec for the backend's realtime protocol.
//!
//! Frames are plain websocket text messages with a numeric prefix:
//! `0` open, `40` namespace connect/confirm, `2`/`3` ping/pong and
//! `42<json-array>` for named events.

use serde::Deserialize;
use serde_json::{Value, json};
use wirebridge_core::{AttachmentDescriptor, WirebridgeError};

use crate::ids::rand_id;

/// Sent in reply to the open frame.
pub const CONNECT: &str = "40";
pub const PONG: &str = "3";

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open(String),
    Connected(String),
    Ping,
    Pong,
    /// An event frame. `None` when the payload carries no `event` object.
    Event(Option<BackendEvent>),
    Other(String),
}

impl Frame {
    pub fn parse(text: &str) -> Result<Frame, WirebridgeError> {
        if text == "2" {
            return Ok(Frame::Ping);
        }
        if text == "3" {
            return Ok(Frame::Pong);
        }
        if let Some(body) = text.strip_prefix("42") {
            return parse_event(body).map(Frame::Event);
        }
        if let Some(rest) = text.strip_prefix("40") {
            return Ok(Frame::Connected(rest.to_string()));
        }
        if let Some(rest) = text.strip_prefix('0') {
            return Ok(Frame::Open(rest.to_string()));
        }
        Ok(Frame::Other(text.to_string()))
    }
}

fn parse_event(body: &str) -> Result<Option<BackendEvent>, WirebridgeError> {
    let items = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            return Err(WirebridgeError::UpstreamProtocol {
                message: "event frame payload is not an array".into(),
            });
        }
        Err(e) => {
            return Err(WirebridgeError::UpstreamProtocol {
                message: format!("event frame is not valid JSON: {e}"),
            });
        }
    };
    let envelope = items
        .into_iter()
        .nth(1)
        .and_then(|v| serde_json::from_value::<EventEnvelope>(v).ok());
    Ok(envelope.and_then(|e| e.event))
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(default)]
    event: Option<BackendEvent>,
}

/// The `event` object inside an event frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BackendEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub delta: Option<EventDelta>,
    #[serde(rename = "agentStatus", default)]
    pub agent_status: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl BackendEvent {
    /// Text carried by a `chatDelta` event.
    pub fn delta_text(&self) -> Option<&str> {
        if self.kind.as_deref() != Some("chatDelta") {
            return None;
        }
        self.delta.as_ref()?.content.as_deref()
    }

    /// Whether this is the terminal `statusUpdate` / `stopped` event.
    pub fn is_stopped(&self) -> bool {
        self.kind.as_deref() == Some("statusUpdate") && self.agent_status.as_deref() == Some("stopped")
    }

    /// Full text of an assistant `chat` event.
    pub fn assistant_text(&self) -> Option<&str> {
        if self.kind.as_deref() == Some("chat") && self.sender.as_deref() == Some("assistant") {
            self.content.as_deref()
        } else {
            None
        }
    }
}

/// The one user message a session sends after the handshake.
#[derive(Debug, Clone)]
pub struct UserMessage {
    pub content: String,
    pub attachments: Vec<AttachmentDescriptor>,
    pub task_mode: String,
    pub country_iso: String,
}

impl UserMessage {
    /// Encode as a `42["message", {...}]` frame. Ids and the timestamp are
    /// fresh on every call.
    pub fn to_frame(&self) -> String {
        let payload = json!([
            "message",
            {
                "id": rand_id(22),
                "timestamp": chrono::Utc::now().timestamp_millis(),
                "messageStatus": "pending",
                "type": "user_message",
                "sessionId": rand_id(22),
                "content": self.content,
                "contents": [],
                "messageType": "text",
                "taskMode": self.task_mode,
                "attachments": self.attachments,
                "extData": {
                    "capabilities": { "enabledConnectors": [] },
                    "mode": "standard"
                },
                "countryIsoCode": self.country_iso,
            }
        ]);
        format!("42{payload}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirebridge_core::AttachmentKind;

    #[test]
    fn control_frames() {
        assert_eq!(Frame::parse("2").unwrap(), Frame::Ping);
        assert_eq!(Frame::parse("3").unwrap(), Frame::Pong);
        assert_eq!(
            Frame::parse(r#"0{"sid":"x"}"#).unwrap(),
            Frame::Open(r#"{"sid":"x"}"#.into())
        );
        assert_eq!(Frame::parse("40").unwrap(), Frame::Connected(String::new()));
        assert_eq!(Frame::parse("41").unwrap(), Frame::Other("41".into()));
    }

    #[test]
    fn delta_event() {
        let f = Frame::parse(r#"42["event",{"event":{"type":"chatDelta","delta":{"content":"hi"}}}]"#)
            .unwrap();
        let Frame::Event(Some(ev)) = f else {
            panic!("expected event, got {f:?}");
        };
        assert_eq!(ev.delta_text(), Some("hi"));
        assert!(!ev.is_stopped());
    }

    #[test]
    fn stop_and_chat_events() {
        let Frame::Event(Some(stop)) =
            Frame::parse(r#"42["e",{"event":{"type":"statusUpdate","agentStatus":"stopped"}}]"#).unwrap()
        else {
            panic!("expected event");
        };
        assert!(stop.is_stopped());

        let Frame::Event(Some(running)) =
            Frame::parse(r#"42["e",{"event":{"type":"statusUpdate","agentStatus":"running"}}]"#).unwrap()
        else {
            panic!("expected event");
        };
        assert!(!running.is_stopped());

        let Frame::Event(Some(chat)) = Frame::parse(
            r#"42["e",{"event":{"type":"chat","sender":"assistant","content":"full"}}]"#,
        )
        .unwrap() else {
            panic!("expected event");
        };
        assert_eq!(chat.assistant_text(), Some("full"));
        assert_eq!(chat.delta_text(), None);
    }

    #[test]
    fn event_without_payload_is_ignored() {
        assert_eq!(Frame::parse(r#"42["e"]"#).unwrap(), Frame::Event(None));
        assert_eq!(Frame::parse(r#"42["e",{"other":1}]"#).unwrap(), Frame::Event(None));
        assert_eq!(Frame::parse(r#"42["e","text"]"#).unwrap(), Frame::Event(None));
    }

    #[test]
    fn malformed_event_is_protocol_error() {
        for raw in [r#"42{"event":{}}"#, "42not json", "42"] {
            let err = Frame::parse(raw).unwrap_err();
            assert!(
                matches!(err, WirebridgeError::UpstreamProtocol { .. }),
                "{raw}: {err:?}"
            );
        }
    }

    #[test]
    fn user_message_frame_shape() {
        let msg = UserMessage {
            content: "User: hello".into(),
            attachments: vec![AttachmentDescriptor {
                filename: "a.png".into(),
                id: "f1".into(),
                kind: AttachmentKind::Image,
                url: "https://cdn/a.png".into(),
                content_type: "image/png".into(),
            }],
            task_mode: "discuss".into(),
            country_iso: "HK".into(),
        };
        let frame = msg.to_frame();
        assert!(frame.starts_with("42[\"message\","));
        let v: Value = serde_json::from_str(&frame[2..]).unwrap();
        let body = &v[1];
        assert_eq!(body["type"], "user_message");
        assert_eq!(body["messageStatus"], "pending");
        assert_eq!(body["content"], "User: hello");
        assert_eq!(body["taskMode"], "discuss");
        assert_eq!(body["countryIsoCode"], "HK");
        assert_eq!(body["id"].as_str().unwrap().len(), 22);
        assert_eq!(body["attachments"][0]["contentType"], "image/png");
        assert_eq!(body["extData"]["mode"], "standard");
        assert_ne!(msg.to_frame(), frame, "ids are regenerated per frame");
    }
}
