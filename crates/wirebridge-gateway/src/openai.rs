// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible request bodies and response objects.
//!
//! Request bodies are parsed leniently: message content may be a string, an
//! array of typed parts, or an object with a `text` field. Everything is
//! reduced to a [`Turn`], the backend-agnostic description of one call.

use serde::Deserialize;
use serde_json::{Value, json};
use wirebridge_access::watermark::strip_zero_width;
use wirebridge_core::{AttachmentDescriptor, AttachmentKind};
use wirebridge_upstream::{AttachmentSource, AttachmentSpec, guess_mime};

use crate::error::ApiError;

const SYSTEM_HEADER: &str = "【System】";
const ATTACHMENTS_HEADER: &str = "【Attachments】";
const CONTINUE_HINT: &str = "User: 请继续。";

/// One inbound call, reduced to what the orchestrator needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Turn {
    /// Raw system text, watermark included.
    pub system: Option<String>,
    /// `User:`/`Assistant:` transcript lines.
    pub transcript: Vec<String>,
    /// The conversation did not end on a user message.
    pub needs_continue: bool,
    /// Text of the last user message, for logging.
    pub last_user: Option<String>,
    pub attachments: Vec<AttachmentSpec>,
}

impl Turn {
    /// Compose the backend prompt.
    ///
    /// Sections are joined by blank lines: system, transcript, attachment
    /// notes, continuation hint.
    pub fn prompt(&self, attachments: &[AttachmentDescriptor]) -> String {
        let mut parts = Vec::new();
        if let Some(system) = &self.system {
            let system = strip_zero_width(system);
            let system = system.trim();
            if !system.is_empty() {
                parts.push(format!("{SYSTEM_HEADER}\n{system}"));
            }
        }
        let transcript = self.transcript.join("\n");
        let transcript = transcript.trim();
        if !transcript.is_empty() {
            parts.push(transcript.to_string());
        }
        if !attachments.is_empty() {
            parts.push(attachment_notes(attachments));
        }
        if self.needs_continue {
            parts.push(CONTINUE_HINT.to_string());
        }
        parts.join("\n\n").trim().to_string()
    }
}

/// `【Attachments】` block listing each file and its MIME type.
pub fn attachment_notes(attachments: &[AttachmentDescriptor]) -> String {
    let lines: Vec<String> = attachments
        .iter()
        .map(|a| format!("- {} ({})", a.filename, a.content_type))
        .collect();
    format!("{ATTACHMENTS_HEADER}\n{}", lines.join("\n"))
}

/// Plain text of a message `content` value.
pub fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => {
                    let kind = obj.get("type").and_then(Value::as_str)?;
                    if !matches!(kind, "text" | "input_text" | "output_text") {
                        return None;
                    }
                    let text = obj
                        .get("text")
                        .and_then(Value::as_str)
                        .filter(|t| !t.is_empty())
                        .or_else(|| obj.get("value").and_then(Value::as_str))
                        .unwrap_or_default();
                    Some(text.to_string())
                }
                _ => None,
            })
            .collect(),
        Value::Object(obj) => obj
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn role_of(message: &Value, default: &str) -> String {
    message
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or(default)
        .trim()
        .to_string()
}

fn transcript_line(role: &str, text: &str) -> String {
    match role {
        "user" => format!("User: {text}"),
        "assistant" => format!("Assistant: {text}"),
        other => format!("{other}: {text}"),
    }
}

fn non_empty_str<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Attachment specs from the content parts of one message.
pub fn extract_attachments(content: &Value) -> Vec<AttachmentSpec> {
    let Value::Array(parts) = content else {
        return Vec::new();
    };
    let mut specs = Vec::new();
    for part in parts {
        let Value::Object(obj) = part else { continue };
        let filename = non_empty_str(obj, "filename").map(str::to_string);
        match obj.get("type").and_then(Value::as_str) {
            Some("image_url") => {
                let url = match obj.get("image_url") {
                    Some(Value::String(s)) => Some(s.as_str()),
                    Some(Value::Object(inner)) => inner.get("url").and_then(Value::as_str),
                    _ => None,
                };
                if let Some(url) = url.filter(|u| !u.is_empty()) {
                    specs.push(AttachmentSpec {
                        kind: AttachmentKind::Image,
                        source: AttachmentSource::Url(url.to_string()),
                        filename,
                        mime: None,
                    });
                }
            }
            Some("input_image") => {
                if let Some(url) = non_empty_str(obj, "image_url") {
                    specs.push(AttachmentSpec {
                        kind: AttachmentKind::Image,
                        source: AttachmentSource::Url(url.to_string()),
                        filename,
                        mime: None,
                    });
                }
            }
            Some("input_file") => {
                let filename = filename.unwrap_or_else(|| "file".to_string());
                let mime = non_empty_str(obj, "mime_type")
                    .map(str::to_string)
                    .unwrap_or_else(|| guess_mime(&filename).to_string());
                let source = if let Some(url) = non_empty_str(obj, "file_url") {
                    AttachmentSource::Url(url.to_string())
                } else if let Some(data) = non_empty_str(obj, "file_data") {
                    AttachmentSource::Data(data.to_string())
                } else {
                    continue;
                };
                specs.push(AttachmentSpec {
                    kind: AttachmentKind::File,
                    source,
                    filename: Some(filename),
                    mime: Some(mime),
                });
            }
            _ => {}
        }
    }
    specs
}

/// `stream` is truthy in the JavaScript sense.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError::invalid("Invalid JSON body."))
}

/// Resolve the requested model; absent means the configured one.
fn check_model(requested: Option<&str>, model_name: &str) -> Result<String, ApiError> {
    let model = requested.filter(|m| !m.is_empty()).unwrap_or(model_name);
    if model != model_name {
        return Err(ApiError::invalid(format!(
            "Model not supported. This endpoint only supports '{model_name}'."
        )));
    }
    Ok(model.to_string())
}

/// `POST /chat/completions` body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Value,
    #[serde(default)]
    pub stream: Value,
}

/// A validated chat request.
#[derive(Debug, Clone)]
pub struct ChatCall {
    pub model: String,
    pub stream: bool,
    pub turn: Turn,
}

impl ChatRequest {
    pub fn parse(body: &[u8], model_name: &str) -> Result<ChatCall, ApiError> {
        let req: ChatRequest = parse_body(body)?;
        let model = check_model(req.model.as_deref(), model_name)?;
        let messages = match &req.messages {
            Value::Array(m) if !m.is_empty() => m,
            _ => return Err(ApiError::invalid("The 'messages' array is required.")),
        };
        Ok(ChatCall {
            model,
            stream: truthy(&req.stream),
            turn: chat_turn(messages),
        })
    }
}

fn chat_turn(messages: &[Value]) -> Turn {
    let mut system = Vec::new();
    let mut transcript = Vec::new();
    for message in messages {
        let role = role_of(message, "");
        let text = extract_text(message.get("content").unwrap_or(&Value::Null));
        if role == "system" {
            if !text.is_empty() {
                system.push(text);
            }
        } else if !text.is_empty() {
            transcript.push(transcript_line(&role, &text));
        }
    }

    let last_user_message = messages.iter().rev().find(|m| role_of(m, "") == "user");
    let needs_continue = messages
        .last()
        .map(|m| role_of(m, ""))
        .is_some_and(|role| !role.is_empty() && role != "user");

    Turn {
        system: (!system.is_empty()).then(|| system.join("\n")),
        transcript,
        needs_continue,
        last_user: last_user_message
            .map(|m| extract_text(m.get("content").unwrap_or(&Value::Null)))
            .filter(|t| !t.is_empty()),
        attachments: last_user_message
            .and_then(|m| m.get("content"))
            .map(extract_attachments)
            .unwrap_or_default(),
    }
}

/// `POST /responses` body.
#[derive(Debug, Default, Deserialize)]
pub struct ResponsesRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Value,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub stream: Value,
    #[serde(default)]
    pub max_output_tokens: Value,
    #[serde(default)]
    pub parallel_tool_calls: Value,
    #[serde(default)]
    pub previous_response_id: Value,
    #[serde(default)]
    pub store: Value,
    #[serde(default)]
    pub temperature: Value,
    #[serde(default)]
    pub tool_choice: Value,
    #[serde(default)]
    pub tools: Value,
    #[serde(default)]
    pub top_p: Value,
    #[serde(default)]
    pub truncation: Value,
    #[serde(default)]
    pub metadata: Value,
}

/// Fields echoed back on every response object, with their defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Passthrough {
    pub instructions: Value,
    pub max_output_tokens: Value,
    pub parallel_tool_calls: Value,
    pub previous_response_id: Value,
    pub store: Value,
    pub temperature: Value,
    pub tool_choice: Value,
    pub tools: Value,
    pub top_p: Value,
    pub truncation: Value,
    pub metadata: Value,
}

fn or_default(value: Value, default: Value) -> Value {
    if value.is_null() { default } else { value }
}

/// A validated responses request.
#[derive(Debug, Clone)]
pub struct ResponsesCall {
    pub model: String,
    pub stream: bool,
    pub turn: Turn,
    pub passthrough: Passthrough,
}

impl ResponsesRequest {
    pub fn parse(body: &[u8], model_name: &str) -> Result<ResponsesCall, ApiError> {
        let req: ResponsesRequest = parse_body(body)?;
        let model = check_model(req.model.as_deref(), model_name)?;
        let turn = responses_turn(&req.instructions, &req.input);
        Ok(ResponsesCall {
            model,
            stream: truthy(&req.stream),
            turn,
            passthrough: Passthrough {
                instructions: req.instructions,
                max_output_tokens: req.max_output_tokens,
                parallel_tool_calls: or_default(req.parallel_tool_calls, json!(true)),
                previous_response_id: req.previous_response_id,
                store: or_default(req.store, json!(false)),
                temperature: or_default(req.temperature, json!(1)),
                tool_choice: or_default(req.tool_choice, json!("auto")),
                tools: or_default(req.tools, json!([])),
                top_p: or_default(req.top_p, json!(1)),
                truncation: or_default(req.truncation, json!("disabled")),
                metadata: or_default(req.metadata, json!({})),
            },
        })
    }
}

fn responses_turn(instructions: &Value, input: &Value) -> Turn {
    let system = instructions
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    let mut transcript = Vec::new();
    let mut last_user = None;
    let mut attachments = Vec::new();
    match input {
        Value::String(s) if !s.trim().is_empty() => {
            transcript.push(format!("User: {}", s.trim()));
            last_user = Some(s.trim().to_string());
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) if !s.trim().is_empty() => {
                        transcript.push(format!("User: {}", s.trim()));
                    }
                    Value::Object(_) => {
                        let role = role_of(item, "user");
                        let text = extract_text(item.get("content").unwrap_or(&Value::Null));
                        if !text.is_empty() {
                            transcript.push(transcript_line(&role, &text));
                        }
                    }
                    _ => {}
                }
            }
            let last_user_item = items
                .iter()
                .rev()
                .find(|it| it.is_object() && role_of(it, "user") == "user");
            if let Some(item) = last_user_item {
                let content = item.get("content").unwrap_or(&Value::Null);
                last_user = Some(extract_text(content)).filter(|t| !t.is_empty());
                attachments = extract_attachments(content);
            }
        }
        _ => {}
    }

    Turn {
        system,
        transcript,
        needs_continue: false,
        last_user,
        attachments,
    }
}

/// `GET /models` body.
pub fn models_list(model_name: &str) -> Value {
    json!({
        "object": "list",
        "data": [{
            "id": model_name,
            "object": "model",
            "created": 0,
            "owned_by": "proxy",
        }],
    })
}

/// Non-streaming `chat.completion` object.
pub fn chat_completion(id: &str, created: i64, model: &str, content: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop",
        }],
        "usage": null,
    })
}

/// One `chat.completion.chunk`. `content: None` with `finish` set is the
/// closing chunk.
pub fn chat_chunk(id: &str, created: i64, model: &str, content: Option<&str>, finish: bool) -> Value {
    let delta = match content {
        Some(text) => json!({ "content": text }),
        None => json!({}),
    };
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": if finish { json!("stop") } else { Value::Null },
        }],
    })
}

/// Identity and echo fields shared by every object of one response.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub id: String,
    pub message_id: String,
    pub created_at: i64,
    pub model: String,
    pub passthrough: Passthrough,
}

impl ResponseEnvelope {
    /// The `response` object. `text: None` renders an empty output list.
    pub fn object(&self, status: &str, text: Option<&str>) -> Value {
        let output = match text {
            Some(text) => json!([{
                "type": "message",
                "id": self.message_id,
                "status": status,
                "role": "assistant",
                "content": [{ "type": "output_text", "text": text, "annotations": [] }],
            }]),
            None => json!([]),
        };
        let p = &self.passthrough;
        json!({
            "id": self.id,
            "object": "response",
            "created_at": self.created_at,
            "status": status,
            "error": null,
            "incomplete_details": null,
            "instructions": p.instructions,
            "max_output_tokens": p.max_output_tokens,
            "model": self.model,
            "output": output,
            "parallel_tool_calls": p.parallel_tool_calls,
            "previous_response_id": p.previous_response_id,
            "reasoning": { "effort": null, "summary": null },
            "store": p.store,
            "temperature": p.temperature,
            "text": { "format": { "type": "text" } },
            "tool_choice": p.tool_choice,
            "tools": p.tools,
            "top_p": p.top_p,
            "truncation": p.truncation,
            "usage": null,
            "user": null,
            "metadata": p.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "vbdo-007";

    fn chat(body: Value) -> Result<ChatCall, ApiError> {
        ChatRequest::parse(body.to_string().as_bytes(), MODEL)
    }

    #[test]
    fn content_shapes() {
        assert_eq!(extract_text(&json!("plain")), "plain");
        assert_eq!(
            extract_text(&json!([
                {"type": "text", "text": "a"},
                "b",
                {"type": "input_text", "value": "c"},
                {"type": "image_url", "image_url": "http://x"},
                {"type": "output_text", "text": "d"}
            ])),
            "abcd"
        );
        assert_eq!(extract_text(&json!({"text": "obj"})), "obj");
        assert_eq!(extract_text(&json!(42)), "");
        assert_eq!(extract_text(&Value::Null), "");
    }

    #[test]
    fn chat_prompt_layout() {
        let call = chat(json!({
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "system", "content": "Be kind."},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "tool", "content": "42"},
                {"role": "user", "content": ""},
                {"role": "user", "content": "thanks"}
            ]
        }))
        .unwrap();
        assert_eq!(call.model, MODEL);
        assert!(!call.stream);
        assert_eq!(
            call.turn.prompt(&[]),
            "【System】\nBe brief.\nBe kind.\n\nUser: hi\nAssistant: hello\ntool: 42\nUser: thanks"
        );
        assert_eq!(call.turn.last_user.as_deref(), Some("thanks"));
    }

    #[test]
    fn chat_ending_on_assistant_asks_to_continue() {
        let call = chat(json!({
            "stream": true,
            "messages": [
                {"role": "user", "content": "write a poem"},
                {"role": "assistant", "content": "Roses are red"}
            ]
        }))
        .unwrap();
        assert!(call.stream);
        assert_eq!(
            call.turn.prompt(&[]),
            "User: write a poem\nAssistant: Roses are red\n\nUser: 请继续。"
        );
    }

    #[test]
    fn attachment_notes_precede_continue_hint() {
        let call = chat(json!({
            "messages": [
                {"role": "user", "content": "see file"},
                {"role": "assistant", "content": "ok"}
            ]
        }))
        .unwrap();
        let descriptor = AttachmentDescriptor {
            filename: "cat.png".into(),
            id: "f1".into(),
            kind: AttachmentKind::Image,
            url: "https://cdn/cat.png".into(),
            content_type: "image/png".into(),
        };
        assert_eq!(
            call.turn.prompt(&[descriptor]),
            "User: see file\nAssistant: ok\n\n【Attachments】\n- cat.png (image/png)\n\nUser: 请继续。"
        );
    }

    #[test]
    fn watermark_symbols_never_reach_the_prompt() {
        let turn = Turn {
            system: Some("Be brief.\u{200B}\u{200C}\u{200D}\u{200E}".into()),
            ..Turn::default()
        };
        assert_eq!(turn.prompt(&[]), "【System】\nBe brief.");
    }

    #[test]
    fn chat_validation_messages() {
        let err = chat(json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "x"}]}))
            .unwrap_err();
        assert_eq!(
            err.message(),
            "Model not supported. This endpoint only supports 'vbdo-007'."
        );

        let err = chat(json!({"messages": []})).unwrap_err();
        assert_eq!(err.message(), "The 'messages' array is required.");
        let err = chat(json!({"messages": "hi"})).unwrap_err();
        assert_eq!(err.message(), "The 'messages' array is required.");

        let err = ChatRequest::parse(b"{not json", MODEL).unwrap_err();
        assert_eq!(err.message(), "Invalid JSON body.");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn attachments_come_from_last_user_message_only() {
        let call = chat(json!({
            "messages": [
                {"role": "user", "content": [
                    {"type": "image_url", "image_url": {"url": "https://old/1.png"}}
                ]},
                {"role": "user", "content": [
                    {"type": "text", "text": "compare"},
                    {"type": "image_url", "image_url": {"url": "https://img/2.png"}},
                    {"type": "image_url", "image_url": "data:image/png;base64,AAAA"},
                    {"type": "input_image", "image_url": "https://img/3.jpg", "filename": "three.jpg"},
                    {"type": "input_file", "filename": "a.pdf", "file_data": "aGVsbG8="},
                    {"type": "input_file", "file_url": "https://files/b", "file_data": "ignored", "mime_type": "text/csv"},
                    {"type": "input_file"}
                ]}
            ]
        }))
        .unwrap();
        let specs = call.turn.attachments;
        assert_eq!(specs.len(), 5);
        assert_eq!(specs[0].source, AttachmentSource::Url("https://img/2.png".into()));
        assert_eq!(specs[0].kind, AttachmentKind::Image);
        assert_eq!(specs[1].source, AttachmentSource::Url("data:image/png;base64,AAAA".into()));
        assert_eq!(specs[2].filename.as_deref(), Some("three.jpg"));
        assert_eq!(specs[3].kind, AttachmentKind::File);
        assert_eq!(specs[3].mime.as_deref(), Some("application/pdf"));
        assert_eq!(specs[3].source, AttachmentSource::Data("aGVsbG8=".into()));
        assert_eq!(specs[4].filename.as_deref(), Some("file"));
        assert_eq!(specs[4].mime.as_deref(), Some("text/csv"));
        assert_eq!(specs[4].source, AttachmentSource::Url("https://files/b".into()));
    }

    #[test]
    fn responses_prompt_and_defaults() {
        let body = json!({
            "instructions": "  Answer in French.  ",
            "input": [
                "  bonjour ",
                {"content": "first"},
                {"role": "assistant", "content": [{"type": "output_text", "text": "reply"}]},
                {"role": "user", "content": [
                    {"type": "input_text", "text": "second"},
                    {"type": "input_image", "image_url": "https://img/x.png"}
                ]}
            ],
            "temperature": 0.2
        });
        let call = ResponsesRequest::parse(body.to_string().as_bytes(), MODEL).unwrap();
        assert_eq!(
            call.turn.prompt(&[]),
            "【System】\nAnswer in French.\n\nUser: bonjour\nUser: first\nAssistant: reply\nUser: second"
        );
        assert_eq!(call.turn.last_user.as_deref(), Some("second"));
        assert_eq!(call.turn.attachments.len(), 1);

        let p = &call.passthrough;
        assert_eq!(p.instructions, json!("  Answer in French.  "));
        assert_eq!(p.temperature, json!(0.2));
        assert_eq!(p.parallel_tool_calls, json!(true));
        assert_eq!(p.store, json!(false));
        assert_eq!(p.tool_choice, json!("auto"));
        assert_eq!(p.tools, json!([]));
        assert_eq!(p.top_p, json!(1));
        assert_eq!(p.truncation, json!("disabled"));
        assert_eq!(p.metadata, json!({}));
        assert!(p.max_output_tokens.is_null());
        assert!(p.previous_response_id.is_null());
    }

    #[test]
    fn responses_string_input() {
        let call = ResponsesRequest::parse(br#"{"input":"  hi  ","stream":1}"#, MODEL).unwrap();
        assert!(call.stream);
        assert_eq!(call.turn.prompt(&[]), "User: hi");
        assert!(!call.turn.needs_continue);
    }

    #[test]
    fn response_object_shape() {
        let envelope = ResponseEnvelope {
            id: "resp_1".into(),
            message_id: "msg_1".into(),
            created_at: 100,
            model: MODEL.into(),
            passthrough: ResponsesRequest::parse(b"{}", MODEL).unwrap().passthrough,
        };
        let pending = envelope.object("in_progress", None);
        assert_eq!(pending["output"], json!([]));
        assert_eq!(pending["status"], "in_progress");

        let done = envelope.object("completed", Some("abc"));
        assert_eq!(done["output"][0]["content"][0]["text"], "abc");
        assert_eq!(done["output"][0]["id"], "msg_1");
        assert_eq!(done["text"]["format"]["type"], "text");
        assert!(done["usage"].is_null());
    }

    #[test]
    fn chunk_shapes() {
        let delta = chat_chunk("c1", 5, MODEL, Some("a"), false);
        assert_eq!(delta["object"], "chat.completion.chunk");
        assert_eq!(delta["choices"][0]["delta"]["content"], "a");
        assert!(delta["choices"][0]["finish_reason"].is_null());

        let last = chat_chunk("c1", 5, MODEL, None, true);
        assert_eq!(last["choices"][0]["delta"], json!({}));
        assert_eq!(last["choices"][0]["finish_reason"], "stop");
    }
}
