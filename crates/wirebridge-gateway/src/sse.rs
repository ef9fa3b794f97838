// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events translation of bridge sessions.
//!
//! Chat completions use unnamed `data:` events terminated by `data: [DONE]`:
//! ```text
//! data: {"object":"chat.completion.chunk","choices":[{"delta":{"content":"a"}, ...}]}
//!
//! data: {"object":"chat.completion.chunk","choices":[{"delta":{},"finish_reason":"stop"}]}
//!
//! data: [DONE]
//! ```
//!
//! Responses use named events (`response.created`,
//! `response.output_text.delta`, `response.output_text.done`,
//! `response.completed`, or `response.error`) with a `sequence_number`
//! starting at 1.
//!
//! Dropping the SSE body (client disconnect) cancels the backend session.

use std::convert::Infallible;

use axum::response::sse::{Event, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use wirebridge_upstream::BridgeEvent;

use crate::error::public_message;
use crate::openai::{ResponseEnvelope, chat_chunk};
use crate::orchestrator::PendingLog;

/// Adapt a bridge channel into a stream.
pub fn receiver_stream(rx: mpsc::Receiver<BridgeEvent>) -> impl Stream<Item = BridgeEvent> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|ev| (ev, rx)) })
}

/// A finished session that produced `text` in one delta.
pub fn canned_reply(text: String) -> impl Stream<Item = BridgeEvent> {
    stream::iter([BridgeEvent::Delta(text.clone()), BridgeEvent::Done(text)])
}

fn error_body(message: String) -> Value {
    json!({ "message": message, "type": "internal_server_error" })
}

/// Identity shared by every chunk of one chat completion.
#[derive(Debug, Clone)]
pub struct ChatMeta {
    pub id: String,
    pub created: i64,
    pub model: String,
}

struct ChatTranslator {
    meta: ChatMeta,
    log: PendingLog,
    _cancel: DropGuard,
}

impl ChatTranslator {
    fn data(value: &Value) -> Event {
        Event::default().data(value.to_string())
    }

    fn on_event(&mut self, event: BridgeEvent) -> Vec<Event> {
        let m = &self.meta;
        match event {
            BridgeEvent::Delta(text) => {
                vec![Self::data(&chat_chunk(&m.id, m.created, &m.model, Some(&text), false))]
            }
            BridgeEvent::Done(_) => {
                self.log.finish(200, None);
                vec![
                    Self::data(&chat_chunk(&m.id, m.created, &m.model, None, true)),
                    Event::default().data("[DONE]"),
                ]
            }
            BridgeEvent::Failed(err) => {
                let message = public_message(&err);
                self.log.finish(500, Some(&message));
                vec![
                    Self::data(&json!({ "error": error_body(message) })),
                    Event::default().data("[DONE]"),
                ]
            }
        }
    }
}

/// Stream a chat completion.
pub fn chat_stream<S>(
    events: S,
    meta: ChatMeta,
    log: PendingLog,
    cancel: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = BridgeEvent> + Send + 'static,
{
    let mut translator = ChatTranslator {
        meta,
        log,
        _cancel: cancel.drop_guard(),
    };
    let body = events
        .map(move |ev| stream::iter(translator.on_event(ev)))
        .flatten()
        .map(Ok);
    Sse::new(body)
}

struct ResponsesTranslator {
    envelope: ResponseEnvelope,
    sequence: u64,
    log: PendingLog,
    _cancel: DropGuard,
}

impl ResponsesTranslator {
    fn event(&mut self, name: &str, mut body: Value) -> Event {
        body["type"] = json!(name);
        body["sequence_number"] = json!(self.sequence);
        self.sequence += 1;
        Event::default().event(name).data(body.to_string())
    }

    fn created(&mut self) -> Event {
        let response = self.envelope.object("in_progress", None);
        self.event("response.created", json!({ "response": response }))
    }

    fn text_part(&self) -> Value {
        json!({
            "item_id": self.envelope.message_id,
            "output_index": 0,
            "content_index": 0,
        })
    }

    fn on_event(&mut self, event: BridgeEvent) -> Vec<Event> {
        match event {
            BridgeEvent::Delta(text) => {
                let mut body = self.text_part();
                body["delta"] = json!(text);
                vec![self.event("response.output_text.delta", body)]
            }
            BridgeEvent::Done(text) => {
                self.log.finish(200, None);
                let mut done = self.text_part();
                done["text"] = json!(text);
                let response = self.envelope.object("completed", Some(&text));
                vec![
                    self.event("response.output_text.done", done),
                    self.event("response.completed", json!({ "response": response })),
                ]
            }
            BridgeEvent::Failed(err) => {
                let message = public_message(&err);
                self.log.finish(500, Some(&message));
                vec![self.event("response.error", json!({ "error": error_body(message) }))]
            }
        }
    }
}

/// Stream a responses-API response.
pub fn responses_stream<S>(
    events: S,
    envelope: ResponseEnvelope,
    log: PendingLog,
    cancel: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = BridgeEvent> + Send + 'static,
{
    let mut translator = ResponsesTranslator {
        envelope,
        sequence: 1,
        log,
        _cancel: cancel.drop_guard(),
    };
    let created = translator.created();
    let body = stream::once(async move { created })
        .chain(
            events
                .map(move |ev| stream::iter(translator.on_event(ev)))
                .flatten(),
        )
        .map(Ok);
    Sse::new(body)
}
