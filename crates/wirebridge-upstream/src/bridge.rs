// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Websocket driver for [`BridgeSession`].
//!
//! One socket per request. Two deadlines bound every session: the connect
//! deadline runs until the backend confirms the handshake, the response
//! deadline covers the whole exchange. A [`CancellationToken`] lets the
//! caller abandon a session early.
//!
//! [`Bridge::complete`] aggregates the reply and retries failures that
//! happen before any text arrived. [`Bridge::stream`] forwards deltas over a
//! channel and never retries.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use wirebridge_config::model::BackendConfig;
use wirebridge_core::{AttachmentDescriptor, WirebridgeError};

use crate::frame::{Frame, UserMessage};
use crate::session::{Action, BridgeSession};

const CLOSE_GRACE: Duration = Duration::from_secs(1);
const STREAM_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub ws_url: String,
    pub locale: String,
    pub timezone: String,
    pub client_type: String,
    pub branch: String,
    pub task_mode: String,
    pub country_iso: String,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
}

impl From<&BackendConfig> for BridgeConfig {
    fn from(c: &BackendConfig) -> Self {
        Self {
            ws_url: c.ws_url.clone(),
            locale: c.locale.clone(),
            timezone: c.timezone.clone(),
            client_type: c.client_type.clone(),
            branch: c.branch.clone(),
            task_mode: c.task_mode.clone(),
            country_iso: c.country_iso.clone(),
            connect_timeout: Duration::from_secs(c.connect_timeout_secs),
            response_timeout: Duration::from_secs(c.response_timeout_secs),
            max_attempts: c.max_attempts,
            retry_base_delay: Duration::from_millis(c.retry_base_delay_ms),
        }
    }
}

/// What a streaming session reports to its consumer.
#[derive(Debug)]
pub enum BridgeEvent {
    Delta(String),
    /// Terminal success, with the full accumulated text.
    Done(String),
    /// Terminal failure. Deltas may already have been delivered.
    Failed(WirebridgeError),
}

#[derive(Clone)]
pub struct Bridge {
    config: Arc<BridgeConfig>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(BridgeConfig::from(config))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Socket URL carrying the credential and client profile as query
    /// parameters.
    pub fn connect_url(&self, token: &str) -> Result<Url, WirebridgeError> {
        let c = &self.config;
        Url::parse_with_params(
            &c.ws_url,
            &[
                ("token", token),
                ("locale", c.locale.as_str()),
                ("tz", c.timezone.as_str()),
                ("clientType", c.client_type.as_str()),
                ("branch", c.branch.as_str()),
                ("EIO", "4"),
                ("transport", "websocket"),
            ],
        )
        .map_err(|e| WirebridgeError::Config(format!("invalid backend ws_url: {e}")))
    }

    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.config.retry_base_delay.saturating_mul(factor)
    }

    fn user_message(&self, prompt: &str, attachments: &[AttachmentDescriptor]) -> UserMessage {
        UserMessage {
            content: prompt.to_string(),
            attachments: attachments.to_vec(),
            task_mode: self.config.task_mode.clone(),
            country_iso: self.config.country_iso.clone(),
        }
    }

    /// Run a session to completion and return the full reply.
    pub async fn complete(
        &self,
        token: &str,
        prompt: &str,
        attachments: &[AttachmentDescriptor],
        cancel: &CancellationToken,
    ) -> Result<String, WirebridgeError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let message = self.user_message(prompt, attachments);
            match self.run_session(token, message, None, cancel).await {
                Ok(text) => {
                    if attempt > 1 {
                        info!(attempt, "backend session succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts && !cancel.is_cancelled() => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "backend session failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(cancelled()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one session in the background, forwarding deltas as they arrive.
    ///
    /// The channel always ends with exactly one `Done` or `Failed`, unless
    /// the receiver is dropped first, which cancels the session.
    pub fn stream(
        &self,
        token: String,
        prompt: String,
        attachments: Vec<AttachmentDescriptor>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<BridgeEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let bridge = self.clone();
        tokio::spawn(async move {
            let message = bridge.user_message(&prompt, &attachments);
            let last = match bridge.run_session(&token, message, Some(&tx), &cancel).await {
                Ok(text) => BridgeEvent::Done(text),
                Err(e) => BridgeEvent::Failed(e),
            };
            let _ = tx.send(last).await;
        });
        rx
    }

    async fn run_session(
        &self,
        token: &str,
        message: UserMessage,
        events: Option<&mpsc::Sender<BridgeEvent>>,
        cancel: &CancellationToken,
    ) -> Result<String, WirebridgeError> {
        let url = self.connect_url(token)?;
        let started = Instant::now();
        let connect_deadline = started + self.config.connect_timeout;
        let response_deadline = started + self.config.response_timeout;

        let (mut ws, _) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = sleep_until(connect_deadline) => {
                return Err(WirebridgeError::UpstreamConnectTimeout {
                    duration: self.config.connect_timeout,
                });
            }
            res = tokio_tungstenite::connect_async(url.as_str()) => {
                res.map_err(|e| socket_error("connect failed", e, false))?
            }
        };
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "backend socket open");

        let mut session = BridgeSession::new(message);
        let outcome = 'session: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(cancelled()),
                _ = sleep_until(connect_deadline), if !session.is_confirmed() => {
                    break Err(WirebridgeError::UpstreamConnectTimeout {
                        duration: self.config.connect_timeout,
                    });
                }
                _ = sleep_until(response_deadline) => {
                    break Err(WirebridgeError::UpstreamResponseTimeout {
                        duration: self.config.response_timeout,
                    });
                }
                next = ws.next() => next,
            };

            let text = match next {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    break Err(connection_lost(
                        &session,
                        format!("backend closed the connection (code {code:?})"),
                    ));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => break Err(socket_error("receive failed", e, session.saw_delta())),
                None => {
                    break Err(connection_lost(
                        &session,
                        "connection ended before completion".to_string(),
                    ));
                }
            };

            let actions = match Frame::parse(text.as_str()).and_then(|f| session.handle(f)) {
                Ok(actions) => actions,
                Err(e) => break Err(e),
            };
            for action in actions {
                match action {
                    Action::Send(out) => {
                        if let Err(e) = ws.send(Message::text(out)).await {
                            break 'session Err(socket_error("send failed", e, session.saw_delta()));
                        }
                    }
                    Action::Confirmed => debug!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "backend handshake confirmed"
                    ),
                    Action::Delta(delta) => {
                        if let Some(tx) = events
                            && tx.send(BridgeEvent::Delta(delta)).await.is_err()
                        {
                            break 'session Err(cancelled());
                        }
                    }
                    Action::Complete(text) => break 'session Ok(text),
                }
            }
        };

        match &outcome {
            Ok(text) => {
                debug!(
                    chars = text.chars().count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "backend session complete"
                );
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "Stream complete".into(),
                };
                let _ = tokio::time::timeout(CLOSE_GRACE, ws.close(Some(frame))).await;
            }
            Err(e) => {
                let state = session.state();
                session.fail();
                warn!(%state, error = %e, "backend session failed");
                let _ = tokio::time::timeout(CLOSE_GRACE, ws.close(None)).await;
            }
        }
        outcome
    }
}

fn cancelled() -> WirebridgeError {
    WirebridgeError::Internal("backend session cancelled".into())
}

fn connection_lost(session: &BridgeSession, message: String) -> WirebridgeError {
    WirebridgeError::UpstreamConnectionLost {
        message,
        after_delta: session.saw_delta(),
    }
}

/// Socket failures are plain transport errors until text has been received;
/// after that they count as a lost connection so they are never retried.
fn socket_error(context: &str, err: tungstenite::Error, after_delta: bool) -> WirebridgeError {
    let message = format!("{context}: {err}");
    if after_delta {
        WirebridgeError::UpstreamConnectionLost {
            message,
            after_delta: true,
        }
    } else {
        WirebridgeError::UpstreamTransport {
            message,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge(ws_url: &str) -> Bridge {
        Bridge::new(BridgeConfig {
            ws_url: ws_url.into(),
            ..BridgeConfig::from(&BackendConfig::default())
        })
    }

    #[test]
    fn connect_url_carries_profile() {
        let url = bridge("wss://backend.test/socket.io/")
            .connect_url("tok en/+")
            .unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/socket.io/");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("token"), Some("tok en/+"));
        assert_eq!(get("locale"), Some("zh-CN"));
        assert_eq!(get("tz"), Some("Asia/Hong_Kong"));
        assert_eq!(get("clientType"), Some("web"));
        assert_eq!(get("branch"), Some(""));
        assert_eq!(get("EIO"), Some("4"));
        assert_eq!(get("transport"), Some("websocket"));
        assert!(!url.as_str().contains("tok en"), "token must be encoded");
    }

    #[test]
    fn invalid_ws_url_is_config_error() {
        let err = bridge("not a url").connect_url("t").unwrap_err();
        assert!(matches!(err, WirebridgeError::Config(_)));
    }

    #[test]
    fn backoff_doubles() {
        let b = bridge("wss://x/");
        assert_eq!(b.backoff(1), Duration::from_millis(250));
        assert_eq!(b.backoff(2), Duration::from_millis(500));
        assert_eq!(b.backoff(3), Duration::from_millis(1000));
    }

    #[test]
    fn transport_classification_follows_delta_state() {
        let before = socket_error("x", tungstenite::Error::ConnectionClosed, false);
        assert!(before.is_retryable());
        let after = socket_error("x", tungstenite::Error::ConnectionClosed, true);
        assert!(!after.is_retryable());
        assert!(after.is_upstream());
    }
}
