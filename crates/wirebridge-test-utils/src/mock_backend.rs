// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted realtime backend for bridge tests.
//!
//! `MockBackend` listens on an ephemeral local port and speaks just enough
//! of the backend's frame protocol to drive one bridge session per
//! connection. Each accepted connection pops the next [`BackendScript`]
//! from a FIFO queue; an empty queue replies with a single `"mock reply"`
//! delta.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

/// How a scripted session ends after its deltas are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// Send `statusUpdate`/`stopped` and wait for the client to close.
    Stop,
    /// Drop the connection without a terminal event.
    Close,
    /// Send nothing further and keep the connection open.
    Hang,
    /// Send a `42` frame whose payload is not a JSON array.
    Malformed,
}

/// One scripted backend conversation.
#[derive(Debug, Clone)]
pub struct BackendScript {
    /// When false the server never confirms the upgrade, so the client's
    /// connect timer fires.
    pub handshake: bool,
    pub ping_first: bool,
    pub deltas: Vec<String>,
    pub assistant_chat: Option<String>,
    pub finish: Finish,
    pub delta_delay: Duration,
}

impl BackendScript {
    pub fn reply<I, T>(deltas: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            handshake: true,
            ping_first: false,
            deltas: deltas.into_iter().map(Into::into).collect(),
            assistant_chat: None,
            finish: Finish::Stop,
            delta_delay: Duration::ZERO,
        }
    }

    /// Never acknowledges the client handshake.
    pub fn silent() -> Self {
        Self {
            handshake: false,
            ..Self::reply(Vec::<String>::new())
        }
    }

    pub fn with_ping(mut self) -> Self {
        self.ping_first = true;
        self
    }

    /// Also send a full assistant `chat` event before finishing.
    pub fn with_chat(mut self, content: impl Into<String>) -> Self {
        self.assistant_chat = Some(content.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delta_delay = delay;
        self
    }

    pub fn then_close(mut self) -> Self {
        self.finish = Finish::Close;
        self
    }

    pub fn then_hang(mut self) -> Self {
        self.finish = Finish::Hang;
        self
    }

    pub fn then_malformed(mut self) -> Self {
        self.finish = Finish::Malformed;
        self
    }
}

#[derive(Default)]
struct Recorded {
    scripts: VecDeque<BackendScript>,
    /// Second element of every `42["message", {...}]` frame received.
    messages: Vec<Value>,
    /// Full request URIs (path and query) of accepted upgrades.
    uris: Vec<String>,
    close_codes: Vec<Option<u16>>,
}

/// A local websocket server replaying [`BackendScript`]s.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<Mutex<Recorded>>,
    connections: Arc<AtomicUsize>,
    pongs: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(Recorded::default()));
        let connections = Arc::new(AtomicUsize::new(0));
        let pongs = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn({
            let state = state.clone();
            let connections = connections.clone();
            let pongs = pongs.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let state = state.clone();
                    let pongs = pongs.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, state, pongs).await {
                            tracing::debug!(error = %e, "mock backend connection ended");
                        }
                    });
                }
            }
        });

        Ok(Self {
            addr,
            state,
            connections,
            pongs,
            task,
        })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/socket.io/", self.addr)
    }

    pub async fn push_script(&self, script: BackendScript) {
        self.state.lock().await.scripts.push_back(script);
    }

    pub async fn messages(&self) -> Vec<Value> {
        self.state.lock().await.messages.clone()
    }

    pub async fn uris(&self) -> Vec<String> {
        self.state.lock().await.uris.clone()
    }

    /// Value of the `token` query parameter for each accepted connection.
    pub async fn tokens(&self) -> Vec<String> {
        self.uris()
            .await
            .iter()
            .filter_map(|uri| query_param(uri, "token"))
            .collect()
    }

    /// Close codes sent by the client, in connection order.
    pub async fn close_codes(&self) -> Vec<Option<u16>> {
        self.state.lock().await.close_codes.clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn pongs(&self) -> usize {
        self.pongs.load(Ordering::SeqCst)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Extract and percent-decode one query parameter.
pub fn query_param(uri: &str, name: &str) -> Option<String> {
    let query = uri.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| percent_decode(v))
    })
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3])
            && let Ok(b) = u8::from_str_radix(hex, 16)
        {
            out.push(b);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

type Ws = WebSocketStream<TcpStream>;

async fn serve_connection(
    stream: TcpStream,
    state: Arc<Mutex<Recorded>>,
    pongs: Arc<AtomicUsize>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut uri = String::new();
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        uri = req.uri().to_string();
        Ok(resp)
    })
    .await?;

    let script = {
        let mut state = state.lock().await;
        state.uris.push(uri);
        state
            .scripts
            .pop_front()
            .unwrap_or_else(|| BackendScript::reply(["mock reply"]))
    };

    ws.send(Message::text(
        r#"0{"sid":"mock","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#,
    ))
    .await?;

    // Client answers the open frame with "40".
    if !wait_for(&mut ws, &state, &pongs, |t| t.starts_with("40")).await {
        return Ok(());
    }

    if !script.handshake {
        drain(&mut ws, &state, &pongs).await;
        return Ok(());
    }

    if script.ping_first {
        ws.send(Message::text("2")).await?;
        if !wait_for(&mut ws, &state, &pongs, |t| t == "3").await {
            return Ok(());
        }
    }

    ws.send(Message::text(r#"40{"sid":"mock"}"#)).await?;

    let mut user_frame = String::new();
    let got_message = wait_for(&mut ws, &state, &pongs, |t| {
        if t.starts_with("42") {
            user_frame = t.to_string();
            true
        } else {
            false
        }
    })
    .await;
    if !got_message {
        return Ok(());
    }
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&user_frame[2..])
        && let Some(payload) = items.get(1)
    {
        state.lock().await.messages.push(payload.clone());
    }

    for delta in &script.deltas {
        if !script.delta_delay.is_zero() {
            tokio::time::sleep(script.delta_delay).await;
        }
        send_event(&mut ws, json!({"type": "chatDelta", "delta": {"content": delta}})).await?;
    }
    if let Some(content) = &script.assistant_chat {
        send_event(
            &mut ws,
            json!({"type": "chat", "sender": "assistant", "content": content}),
        )
        .await?;
    }

    match script.finish {
        Finish::Stop => {
            send_event(&mut ws, json!({"type": "statusUpdate", "agentStatus": "stopped"})).await?;
            drain(&mut ws, &state, &pongs).await;
        }
        Finish::Close => {
            // Drop the TCP stream without a close handshake.
            drop(ws);
        }
        Finish::Hang => drain(&mut ws, &state, &pongs).await,
        Finish::Malformed => {
            ws.send(Message::text(r#"42{"event":"not an array"}"#)).await?;
            drain(&mut ws, &state, &pongs).await;
        }
    }
    Ok(())
}

async fn send_event(ws: &mut Ws, event: Value) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let frame = json!(["event", {"event": event}]);
    ws.send(Message::text(format!("42{frame}"))).await
}

/// Read until `want` matches a text frame. Returns false when the client
/// went away first.
async fn wait_for<F>(
    ws: &mut Ws,
    state: &Mutex<Recorded>,
    pongs: &AtomicUsize,
    mut want: F,
) -> bool
where
    F: FnMut(&str) -> bool,
{
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if text.as_str() == "3" {
                    pongs.fetch_add(1, Ordering::SeqCst);
                }
                if want(text.as_str()) {
                    return true;
                }
            }
            Ok(Message::Close(frame)) => {
                state
                    .lock()
                    .await
                    .close_codes
                    .push(frame.map(|f| u16::from(f.code)));
                return false;
            }
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    false
}

/// Consume frames until the client closes.
async fn drain(ws: &mut Ws, state: &Mutex<Recorded>, pongs: &AtomicUsize) {
    wait_for(ws, state, pongs, |_| false).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_are_decoded() {
        let uri = "/socket.io/?token=a%2Bb&tz=Asia%2FHong_Kong&EIO=4";
        assert_eq!(query_param(uri, "token").as_deref(), Some("a+b"));
        assert_eq!(query_param(uri, "tz").as_deref(), Some("Asia/Hong_Kong"));
        assert_eq!(query_param(uri, "missing"), None);
        assert_eq!(query_param("/no-query", "token"), None);
    }

    #[tokio::test]
    async fn scripts_are_consumed_in_order() {
        let backend = MockBackend::start().await.unwrap();
        backend.push_script(BackendScript::reply(["a"])).await;
        backend.push_script(BackendScript::silent()).await;
        assert_eq!(backend.state.lock().await.scripts.len(), 2);
        assert!(backend.ws_url().starts_with("ws://127.0.0.1:"));
        assert_eq!(backend.connections(), 0);
    }
}
