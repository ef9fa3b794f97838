// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request bridge state machine.
//!
//! `BridgeSession` is driven by decoded frames and answers with the actions
//! the socket driver must perform. It owns no I/O, so every transition can
//! be exercised without a network.

use wirebridge_core::WirebridgeError;

use crate::frame::{self, Frame, UserMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Connecting,
    HandshakeSent,
    Ready,
    Streaming,
    Done,
    Error,
}

/// Something the driver must do in response to a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write a text frame to the socket.
    Send(String),
    /// The backend confirmed the connection; the connect timer can stop.
    Confirmed,
    /// A piece of response text.
    Delta(String),
    /// The backend finished. Carries the full response text.
    Complete(String),
}

pub struct BridgeSession {
    state: SessionState,
    message: UserMessage,
    text: String,
    deltas: usize,
    assistant_fallback: Option<String>,
    frames_sent: u64,
}

impl BridgeSession {
    pub fn new(message: UserMessage) -> Self {
        Self {
            state: SessionState::Connecting,
            message,
            text: String::new(),
            deltas: 0,
            assistant_fallback: None,
            frames_sent: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.state,
            SessionState::Ready | SessionState::Streaming | SessionState::Done
        )
    }

    pub fn saw_delta(&self) -> bool {
        self.deltas > 0
    }

    /// Text accumulated from deltas so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of frames this session asked the driver to send.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Move to `Error`. Terminal states are left untouched.
    pub fn fail(&mut self) {
        if self.state != SessionState::Done {
            self.state = SessionState::Error;
        }
    }

    /// Feed one inbound frame.
    pub fn handle(&mut self, frame: Frame) -> Result<Vec<Action>, WirebridgeError> {
        if matches!(self.state, SessionState::Done | SessionState::Error) {
            return Ok(Vec::new());
        }

        let actions = match frame {
            Frame::Ping => vec![self.send(frame::PONG.to_string())],
            Frame::Open(_) if self.state == SessionState::Connecting => {
                self.state = SessionState::HandshakeSent;
                vec![self.send(frame::CONNECT.to_string())]
            }
            Frame::Connected(_)
                if matches!(
                    self.state,
                    SessionState::Connecting | SessionState::HandshakeSent
                ) =>
            {
                self.state = SessionState::Ready;
                let user_frame = self.message.to_frame();
                vec![Action::Confirmed, self.send(user_frame)]
            }
            Frame::Event(Some(event)) if self.is_confirmed() => {
                if let Some(delta) = event.delta_text() {
                    self.state = SessionState::Streaming;
                    self.deltas += 1;
                    self.text.push_str(delta);
                    vec![Action::Delta(delta.to_string())]
                } else if event.is_stopped() {
                    self.state = SessionState::Done;
                    vec![Action::Complete(self.final_text())]
                } else {
                    if self.assistant_fallback.is_none()
                        && let Some(text) = event.assistant_text()
                    {
                        self.assistant_fallback = Some(text.to_string());
                    }
                    Vec::new()
                }
            }
            other => {
                tracing::trace!(state = %self.state, frame = ?other, "ignoring frame");
                Vec::new()
            }
        };
        Ok(actions)
    }

    fn send(&mut self, text: String) -> Action {
        self.frames_sent += 1;
        Action::Send(text)
    }

    /// Delta text, or the first assistant `chat` event when no delta arrived.
    fn final_text(&self) -> String {
        if self.text.is_empty() {
            self.assistant_fallback.clone().unwrap_or_default()
        } else {
            self.text.clone()
        }
    }
}
