use super::*;
use crate::error::{DownloadError, Error, TransmissionError};
use crate::progress::ProgressSink;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123:TEST";

/// Records every progress callback
#[derive(Default)]
struct RecordingSink(Vec<(u64, u64)>);

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn on_progress(&mut self, current: u64, total: u64) {
        self.0.push((current, total));
    }
}

async fn transport_for(server: &MockServer) -> BotApiTransport {
    BotApiTransport::with_api_base(TOKEN, server.uri()).unwrap()
}

fn message_ok(chat_id: i64, message_id: i64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "ok": true,
        "result": {"message_id": message_id, "chat": {"id": chat_id}, "date": 0}
    }))
}

fn api_path(method_name: &str) -> String {
    format!("/bot{}/{}", TOKEN, method_name)
}

#[tokio::test]
async fn send_text_posts_html_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .and(body_partial_json(json!({
            "chat_id": -1001234,
            "text": "<b>hi</b>",
            "parse_mode": "HTML",
            "disable_notification": true
        })))
        .respond_with(message_ok(-1001234, 55))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server).await;
    let handle = transport.send_text(-1001234, "<b>hi</b>").await.unwrap();

    assert_eq!(
        handle,
        MessageHandle {
            chat_id: -1001234,
            message_id: 55
        }
    );
}

#[tokio::test]
async fn too_many_requests_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendMessage")))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 7",
            "parameters": {"retry_after": 7}
        })))
        .mount(&server)
        .await;

    let transport = transport_for(&server).await;
    let err = transport.send_text(1, "x").await.unwrap_err();

    match err {
        Error::Transmission(TransmissionError::RateLimited { retry_after }) => {
            assert_eq!(retry_after, Duration::from_secs(7));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn api_error_maps_to_rejected_with_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("deleteMessage")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message to delete not found"
        })))
        .mount(&server)
        .await;

    let transport = transport_for(&server).await;
    let err = transport
        .delete_message(&MessageHandle {
            chat_id: 1,
            message_id: 2,
        })
        .await
        .unwrap_err();

    match err {
        Error::Transmission(TransmissionError::Rejected { reason, .. }) => {
            assert!(reason.contains("not found"), "got {reason}");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn unchanged_edit_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("editMessageText")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message is not modified"
        })))
        .mount(&server)
        .await;

    let transport = transport_for(&server).await;
    let result = transport
        .edit_text(
            &MessageHandle {
                chat_id: 1,
                message_id: 2,
            },
            "Upload progress: 50.00%",
        )
        .await;

    assert!(result.is_ok(), "got {result:?}");
}

#[tokio::test]
async fn download_streams_file_and_reports_progress() {
    let server = MockServer::start().await;
    let payload = vec![7u8; 64 * 1024];

    Mock::given(method("POST"))
        .and(path(api_path("getFile")))
        .and(body_partial_json(json!({"file_id": "file-abc"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"file_id": "file-abc", "file_path": "documents/file_1.zip", "file_size": payload.len()}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/file/bot{}/documents/file_1.zip", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("course.zip");
    let transfer = IncomingTransfer::new(1, "course.zip", payload.len() as u64, "file-abc");
    let mut sink = RecordingSink::default();

    let transport = transport_for(&server).await;
    let written = transport
        .download(&transfer, &dest, &mut sink)
        .await
        .unwrap();

    assert_eq!(written, payload.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), payload);
    assert_eq!(
        sink.0.last().copied(),
        Some((payload.len() as u64, payload.len() as u64))
    );
}

#[tokio::test]
async fn short_download_is_size_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("getFile")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"file_id": "f", "file_path": "documents/f.pdf"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/file/bot{}/documents/f.pdf", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"short".to_vec()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let transfer = IncomingTransfer::new(1, "report.pdf", 999, "f");

    let transport = transport_for(&server).await;
    let err = transport
        .download(
            &transfer,
            &dir.path().join("report.pdf"),
            &mut RecordingSink::default(),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            Error::Download(DownloadError::SizeMismatch {
                expected: 999,
                actual: 5,
                ..
            })
        ),
        "got {err:?}"
    );
}

#[tokio::test]
async fn missing_file_path_is_download_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("getFile")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {"file_id": "big"}
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let transfer = IncomingTransfer::new(1, "huge.zip", 0, "big");

    let transport = transport_for(&server).await;
    let err = transport
        .download(
            &transfer,
            &dir.path().join("huge.zip"),
            &mut RecordingSink::default(),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::Download(DownloadError::Transport { .. })),
        "got {err:?}"
    );
}

#[tokio::test]
async fn send_document_uploads_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendDocument")))
        .respond_with(message_ok(-100999, 12))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let doc = dir.path().join("report.pdf");
    std::fs::write(&doc, b"%PDF-1.4").unwrap();

    let transport = transport_for(&server).await;
    let handle = transport
        .send_document(-100999, &doc, "report")
        .await
        .unwrap();

    assert_eq!(handle.message_id, 12);
    assert_eq!(handle.chat_id, -100999);
}

#[tokio::test]
async fn send_video_uploads_and_finishes_progress() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(api_path("sendVideo")))
        .respond_with(message_ok(-100999, 13))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let video = dir.path().join("1. Welcome.mp4");
    let thumb = dir.path().join("1. Welcome_thumbnail.jpg");
    std::fs::write(&video, vec![1u8; 10_000]).unwrap();
    std::fs::write(&thumb, b"jpg").unwrap();

    let upload = VideoUpload {
        path: video,
        duration_secs: 95,
        width: 1280,
        height: 720,
        thumbnail: thumb,
        caption: "<b>1. Welcome</b>".into(),
    };
    let mut sink = RecordingSink::default();

    let transport = transport_for(&server).await;
    let handle = transport
        .send_video(-100999, &upload, &mut sink)
        .await
        .unwrap();

    assert_eq!(handle.message_id, 13);
    assert_eq!(sink.0.last().copied(), Some((10_000, 10_000)));
}

#[test]
fn debug_output_hides_token() {
    let transport = BotApiTransport::new("secret-token").unwrap();
    let rendered = format!("{transport:?}");
    assert!(!rendered.contains("secret-token"));
    assert_eq!(transport.name(), "bot-api");
}

#[tokio::test]
async fn api_base_path_prefix_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/telegram/bot{}/sendMessage", TOKEN)))
        .respond_with(message_ok(-100, 8))
        .expect(1)
        .mount(&server)
        .await;

    let transport =
        BotApiTransport::with_api_base(TOKEN, format!("{}/telegram/", server.uri())).unwrap();
    let handle = transport.send_text(-100, "prefixed").await.unwrap();
    assert_eq!(handle.message_id, 8);
}

#[test]
fn unusable_api_base_is_config_error() {
    for base in ["not a url", "mailto:bot@example.com", "ftp://example.com"] {
        match BotApiTransport::with_api_base(TOKEN, base) {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("api_base")),
            other => panic!("{base}: expected config error, got {other:?}"),
        }
    }
}
