// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment materialization.
//!
//! Caller attachments arrive as `data:` literals, bare base64, or remote
//! URLs. Each one is turned into bytes plus a MIME type, then pushed to the
//! backend's storage with a three-step upload: presign, PUT, complete. Any
//! failure aborts the whole batch.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use wirebridge_config::model::{AttachmentConfig, BackendConfig};
use wirebridge_core::{AttachmentDescriptor, AttachmentKind, AttachmentStep, WirebridgeError};

use crate::fetch;
use crate::ids::rand_id;

const PRESIGN_PATH: &str = "/api/chat/getPresignedUploadUrl";
const COMPLETE_PATH: &str = "/api/chat/uploadComplete";
const OCTET_STREAM: &str = "application/octet-stream";

/// Where an attachment's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// A URL: either a `data:` literal or a remote http(s) location.
    Url(String),
    /// Inline data: either a `data:` literal or bare base64.
    Data(String),
}

/// One attachment as extracted from a caller request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSpec {
    pub kind: AttachmentKind,
    pub source: AttachmentSource,
    pub filename: Option<String>,
    pub mime: Option<String>,
}

/// Bytes ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// MIME type implied by a filename's extension.
pub fn guess_mime(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    let ext = match lower.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => return OCTET_STREAM,
    };
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "zip" => "application/zip",
        _ => OCTET_STREAM,
    }
}

fn default_filename(kind: AttachmentKind) -> &'static str {
    match kind {
        AttachmentKind::Image => "image.png",
        AttachmentKind::File => "file.bin",
    }
}

/// Split a `data:<mime>[;params],<base64>` literal.
pub fn parse_data_url(literal: &str) -> Result<(Option<String>, Vec<u8>), WirebridgeError> {
    let rest = literal
        .strip_prefix("data:")
        .ok_or_else(|| WirebridgeError::attachment(AttachmentStep::Decode, "not a data url"))?;
    let (header, body) = rest.split_once(',').ok_or_else(|| {
        WirebridgeError::attachment(AttachmentStep::Decode, "data url has no payload")
    })?;
    let mime = header.split(';').next().unwrap_or("").trim();
    let bytes = decode_base64(body)?;
    Ok(((!mime.is_empty()).then(|| mime.to_string()), bytes))
}

fn decode_base64(body: &str) -> Result<Vec<u8>, WirebridgeError> {
    let cleaned: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(|e| WirebridgeError::Attachment {
        step: AttachmentStep::Decode,
        message: format!("invalid base64 payload: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Client for the backend's upload endpoints.
#[derive(Clone)]
pub struct Uploader {
    http: reqwest::Client,
    api_base: String,
    origin: String,
    profile: Vec<(&'static str, String)>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Presigned {
    upload_url: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Completed {
    file_url: Option<String>,
}

impl Uploader {
    pub fn new(backend: &BackendConfig, timeout: Duration) -> Result<Self, WirebridgeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WirebridgeError::Internal(format!("failed to build upload client: {e}")))?;
        Ok(Self {
            http,
            api_base: backend.api_base.trim_end_matches('/').to_string(),
            origin: backend.origin.trim_end_matches('/').to_string(),
            profile: vec![
                ("x-client-type", backend.client_type.clone()),
                ("x-client-locale", backend.locale.clone()),
                ("x-client-timezone", backend.timezone.clone()),
                ("x-client-timezone-offset", backend.timezone_offset.clone()),
            ],
        })
    }

    fn api_headers(&self, token: &str, client_id: &str) -> Result<HeaderMap, WirebridgeError> {
        let mut headers = HeaderMap::new();
        let mut put = |name: &'static str, value: &str| -> Result<(), WirebridgeError> {
            let value = HeaderValue::from_str(value).map_err(|e| {
                WirebridgeError::attachment(AttachmentStep::Presign, format!("invalid {name} header: {e}"))
            })?;
            headers.insert(HeaderName::from_static(name), value);
            Ok(())
        };
        put("accept", "*/*")?;
        put("content-type", "application/json")?;
        put("origin", &self.origin)?;
        put("referer", &format!("{}/", self.origin))?;
        put("user-agent", "Mozilla/5.0")?;
        for (name, value) in &self.profile {
            put(*name, value)?;
        }
        put("x-client-id", client_id)?;
        put("authorization", &format!("Bearer {token}"))?;
        Ok(headers)
    }

    /// Presign, transfer and complete. Returns `(file id, file url)`.
    pub async fn upload(
        &self,
        token: &str,
        payload: &Payload,
    ) -> Result<(String, String), WirebridgeError> {
        let headers = self.api_headers(token, &rand_id(22))?;
        let size = payload.bytes.len();

        let presign_body = json!({
            "filename": payload.filename,
            "fileType": payload.mime,
            "fileSize": size,
            "id": format!("temp-{}", rand_id(22)),
        });
        let presigned: Envelope<Presigned> = self
            .post_json(
                AttachmentStep::Presign,
                "getPresignedUploadUrl",
                PRESIGN_PATH,
                headers.clone(),
                &presign_body,
            )
            .await?;
        let (upload_url, file_id) = match presigned.data {
            Some(Presigned {
                upload_url: Some(url),
                id: Some(id),
            }) if !url.is_empty() && !id.is_empty() => (url, id),
            _ => {
                return Err(WirebridgeError::attachment(
                    AttachmentStep::Presign,
                    "getPresignedUploadUrl bad response: missing uploadUrl or id",
                ));
            }
        };

        let put = self
            .http
            .put(&upload_url)
            .header("accept", "*/*")
            .header("content-type", &payload.mime)
            .header("origin", &self.origin)
            .header("referer", format!("{}/", self.origin))
            .body(payload.bytes.clone())
            .send()
            .await
            .map_err(|e| WirebridgeError::Attachment {
                step: AttachmentStep::Transfer,
                message: format!("upload PUT failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        if !put.status().is_success() {
            let status = put.status().as_u16();
            let text = put.text().await.unwrap_or_default();
            return Err(WirebridgeError::attachment(
                AttachmentStep::Transfer,
                format!("upload PUT failed: {status} {text}"),
            ));
        }

        let complete_body = json!({ "filename": payload.filename, "fileSize": size, "id": file_id });
        let completed: Envelope<Completed> = self
            .post_json(
                AttachmentStep::Complete,
                "uploadComplete",
                COMPLETE_PATH,
                headers,
                &complete_body,
            )
            .await?;
        let file_url = completed
            .data
            .and_then(|d| d.file_url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                WirebridgeError::attachment(
                    AttachmentStep::Complete,
                    "uploadComplete bad response: missing fileUrl",
                )
            })?;

        Ok((file_id, file_url))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        step: AttachmentStep,
        label: &str,
        path: &str,
        headers: HeaderMap,
        body: &Value,
    ) -> Result<T, WirebridgeError> {
        let response = self
            .http
            .post(format!("{}{path}", self.api_base))
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| WirebridgeError::Attachment {
                step,
                message: format!("{label} failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(WirebridgeError::attachment(
                step,
                format!("{label} failed: {} {text}", status.as_u16()),
            ));
        }
        response.json::<T>().await.map_err(|e| WirebridgeError::Attachment {
            step,
            message: format!("{label} bad response: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

/// Resolves attachment specs into backend-hosted descriptors.
#[derive(Clone)]
pub struct AttachmentPipeline {
    uploader: Uploader,
    downloader: reqwest::Client,
    allow_private: bool,
    max_bytes: u64,
}

impl AttachmentPipeline {
    pub fn new(backend: &BackendConfig, config: &AttachmentConfig) -> Result<Self, WirebridgeError> {
        let timeout = Duration::from_secs(config.download_timeout_secs);
        Ok(Self {
            uploader: Uploader::new(backend, timeout)?,
            downloader: fetch::build_download_client(config.allow_private_hosts, timeout)?,
            allow_private: config.allow_private_hosts,
            max_bytes: config.max_bytes,
        })
    }

    /// Resolve every spec in order. The first failure aborts the batch.
    pub async fn resolve_all(
        &self,
        token: &str,
        specs: &[AttachmentSpec],
    ) -> Result<Vec<AttachmentDescriptor>, WirebridgeError> {
        let mut out = Vec::with_capacity(specs.len());
        for spec in specs {
            out.push(self.resolve(token, spec).await?);
        }
        if !out.is_empty() {
            info!(count = out.len(), "attachments uploaded");
        }
        Ok(out)
    }

    pub async fn resolve(
        &self,
        token: &str,
        spec: &AttachmentSpec,
    ) -> Result<AttachmentDescriptor, WirebridgeError> {
        let payload = self.materialize(spec).await?;
        let (id, url) = self.uploader.upload(token, &payload).await?;
        debug!(filename = %payload.filename, mime = %payload.mime, bytes = payload.bytes.len(), "attachment uploaded");
        Ok(AttachmentDescriptor {
            kind: AttachmentKind::from_mime(&payload.mime),
            filename: payload.filename,
            id,
            url,
            content_type: payload.mime,
        })
    }

    /// Turn a spec into bytes, a filename and a MIME type.
    pub async fn materialize(&self, spec: &AttachmentSpec) -> Result<Payload, WirebridgeError> {
        let filename = spec
            .filename
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| default_filename(spec.kind).to_string());
        let mut mime = spec
            .mime
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| guess_mime(&filename).to_string());

        let bytes = match &spec.source {
            AttachmentSource::Url(s) | AttachmentSource::Data(s) if s.starts_with("data:") => {
                let (declared, bytes) = parse_data_url(s)?;
                if let Some(declared) = declared {
                    mime = declared;
                }
                bytes
            }
            AttachmentSource::Url(url) => {
                let (content_type, bytes) = self.download(url).await?;
                if let Some(ct) = content_type {
                    mime = ct;
                }
                bytes
            }
            AttachmentSource::Data(b64) => decode_base64(b64)?,
        };

        if bytes.len() as u64 > self.max_bytes {
            return Err(WirebridgeError::attachment(
                AttachmentStep::Decode,
                format!("attachment exceeds {} bytes", self.max_bytes),
            ));
        }
        Ok(Payload {
            filename,
            mime,
            bytes,
        })
    }

    async fn download(&self, raw: &str) -> Result<(Option<String>, Vec<u8>), WirebridgeError> {
        let url = fetch::check_url(raw, self.allow_private)?;
        let response = self
            .downloader
            .get(url)
            .send()
            .await
            .map_err(|e| WirebridgeError::Attachment {
                step: AttachmentStep::Download,
                message: format!("failed to download attachment url: {e}"),
                source: Some(Box::new(e)),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(WirebridgeError::attachment(
                AttachmentStep::Download,
                format!("failed to download attachment url: {}", status.as_u16()),
            ));
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(WirebridgeError::attachment(
                AttachmentStep::Download,
                format!("attachment exceeds {} bytes", self.max_bytes),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let mut bytes = Vec::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| WirebridgeError::Attachment {
                step: AttachmentStep::Download,
                message: format!("attachment download interrupted: {e}"),
                source: Some(Box::new(e)),
            })?;
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(WirebridgeError::attachment(
                    AttachmentStep::Download,
                    format!("attachment exceeds {} bytes", self.max_bytes),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok((content_type, bytes))
    }
}
