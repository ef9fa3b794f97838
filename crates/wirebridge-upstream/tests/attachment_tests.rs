// SPDX-FileCopyrightText: 2026 Wirebridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upload pipeline against wiremock stand-ins for the backend's file API.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wirebridge_config::model::{AttachmentConfig, BackendConfig};
use wirebridge_core::{AttachmentKind, AttachmentStep, WirebridgeError};
use wirebridge_upstream::{AttachmentPipeline, AttachmentSource, AttachmentSpec};

// 1x1 transparent PNG.
const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

fn pipeline(server: &MockServer) -> AttachmentPipeline {
    let backend = BackendConfig {
        api_base: server.uri(),
        origin: "https://frontend.test".into(),
        ..BackendConfig::default()
    };
    let attachments = AttachmentConfig {
        allow_private_hosts: true,
        ..AttachmentConfig::default()
    };
    AttachmentPipeline::new(&backend, &attachments).unwrap()
}

async fn mount_upload(server: &MockServer, file_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/chat/getPresignedUploadUrl"))
        .and(header("authorization", "Bearer cred-token"))
        .and(header("x-client-type", "web"))
        .and(header("origin", "https://frontend.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "uploadUrl": format!("{}/bucket/{file_id}", server.uri()), "id": file_id }
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/bucket/{file_id}")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat/uploadComplete"))
        .and(body_partial_json(json!({ "id": file_id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "fileUrl": format!("https://cdn.test/{file_id}") }
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn inline_png_becomes_image_descriptor() {
    let server = MockServer::start().await;
    mount_upload(&server, "file-1").await;

    let spec = AttachmentSpec {
        kind: AttachmentKind::Image,
        source: AttachmentSource::Data(PNG_B64.into()),
        filename: None,
        mime: None,
    };
    let out = pipeline(&server).resolve_all("cred-token", &[spec]).await.unwrap();

    assert_eq!(out.len(), 1);
    let d = &out[0];
    assert_eq!(d.kind, AttachmentKind::Image);
    assert_eq!(d.content_type, "image/png");
    assert_eq!(d.filename, "image.png");
    assert_eq!(d.id, "file-1");
    assert_eq!(d.url, "https://cdn.test/file-1");
}

#[tokio::test]
async fn presign_payload_describes_the_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/getPresignedUploadUrl"))
        .and(body_partial_json(json!({
            "filename": "report.pdf",
            "fileType": "application/pdf",
            "fileSize": 5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "uploadUrl": format!("{}/bucket/r", server.uri()), "id": "r" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/bucket/r"))
        .and(header("content-type", "application/pdf"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat/uploadComplete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "fileUrl": "https://cdn.test/r" }
        })))
        .mount(&server)
        .await;

    let spec = AttachmentSpec {
        kind: AttachmentKind::File,
        source: AttachmentSource::Data("aGVsbG8=".into()),
        filename: Some("report.pdf".into()),
        mime: None,
    };
    let d = pipeline(&server).resolve("cred-token", &spec).await.unwrap();
    assert_eq!(d.kind, AttachmentKind::File);
    assert_eq!(d.content_type, "application/pdf");
}

#[tokio::test]
async fn failed_presign_skips_transfer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/getPresignedUploadUrl"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let spec = AttachmentSpec {
        kind: AttachmentKind::Image,
        source: AttachmentSource::Data(PNG_B64.into()),
        filename: None,
        mime: None,
    };
    let err = pipeline(&server).resolve("cred-token", &spec).await.unwrap_err();
    match err {
        WirebridgeError::Attachment { step, message, .. } => {
            assert_eq!(step, AttachmentStep::Presign);
            assert_eq!(message, "getPresignedUploadUrl failed: 403 denied");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_file_url_fails_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat/getPresignedUploadUrl"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "uploadUrl": format!("{}/bucket/x", server.uri()), "id": "x" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat/uploadComplete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .mount(&server)
        .await;

    let spec = AttachmentSpec {
        kind: AttachmentKind::File,
        source: AttachmentSource::Data("aGVsbG8=".into()),
        filename: None,
        mime: None,
    };
    let err = pipeline(&server).resolve("cred-token", &spec).await.unwrap_err();
    assert!(matches!(err, WirebridgeError::Attachment { step: AttachmentStep::Complete, .. }));
}

#[tokio::test]
async fn remote_download_uses_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/photos/cat"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg; charset=binary")
                .set_body_bytes(vec![0xff, 0xd8, 0xff]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let spec = AttachmentSpec {
        kind: AttachmentKind::Image,
        source: AttachmentSource::Url(format!("{}/photos/cat", server.uri())),
        filename: None,
        mime: None,
    };
    let payload = pipeline(&server).materialize(&spec).await.unwrap();
    assert_eq!(payload.mime, "image/jpeg");
    assert_eq!(payload.filename, "image.png");
    assert_eq!(payload.bytes, vec![0xff, 0xd8, 0xff]);
}

#[tokio::test]
async fn remote_download_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let spec = AttachmentSpec {
        kind: AttachmentKind::Image,
        source: AttachmentSource::Url(format!("{}/gone.png", server.uri())),
        filename: None,
        mime: None,
    };
    let err = pipeline(&server).materialize(&spec).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "attachment download failed: failed to download attachment url: 404"
    );
}

#[tokio::test]
async fn batch_aborts_on_first_failure() {
    let server = MockServer::start().await;
    mount_upload(&server, "ok-1").await;

    let good = AttachmentSpec {
        kind: AttachmentKind::Image,
        source: AttachmentSource::Data(PNG_B64.into()),
        filename: None,
        mime: None,
    };
    let bad = AttachmentSpec {
        kind: AttachmentKind::File,
        source: AttachmentSource::Data("***".into()),
        filename: None,
        mime: None,
    };
    let err = pipeline(&server)
        .resolve_all("cred-token", &[good, bad])
        .await
        .unwrap_err();
    assert!(matches!(err, WirebridgeError::Attachment { step: AttachmentStep::Decode, .. }));
}
