//! Telegram Bot HTTP API transport

use super::{Transport, VideoUpload};
use crate::error::{DownloadError, Error, Result, TransmissionError};
use crate::progress::ProgressSink;
use crate::types::{IncomingTransfer, MessageHandle};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

/// Public Bot API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Connection establishment limit for every request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Limit for small JSON calls; uploads and downloads are bounded by the stage timeout instead
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry delay used when a 429 carries no `retry_after`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message_id: i64,
    chat: ApiChat,
}

#[derive(Debug, Deserialize)]
struct ApiChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    file_path: Option<String>,
    file_size: Option<u64>,
}

impl From<ApiMessage> for MessageHandle {
    fn from(message: ApiMessage) -> Self {
        MessageHandle {
            chat_id: message.chat.id,
            message_id: message.message_id,
        }
    }
}

/// Why a Bot API call did not produce a result
#[derive(Debug)]
enum ApiFailure {
    RateLimited(Duration),
    Rejected(String),
    Transport(String),
}

impl ApiFailure {
    fn into_transmission(self, what: &str) -> Error {
        let error = match self {
            ApiFailure::RateLimited(retry_after) => TransmissionError::RateLimited { retry_after },
            ApiFailure::Rejected(reason) => TransmissionError::Rejected {
                file: what.to_string(),
                reason,
            },
            ApiFailure::Transport(reason) => TransmissionError::Transport {
                file: what.to_string(),
                reason,
            },
        };
        Error::Transmission(error)
    }

    fn into_download(self, file: &str) -> Error {
        let reason = match self {
            ApiFailure::RateLimited(retry_after) => {
                format!("rate limited, retry after {:?}", retry_after)
            }
            ApiFailure::Rejected(reason) | ApiFailure::Transport(reason) => reason,
        };
        Error::Download(DownloadError::Transport {
            file: file.to_string(),
            reason,
        })
    }
}

async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> std::result::Result<T, ApiFailure> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| ApiFailure::Transport(e.to_string()))?;

    let parsed: ApiResponse<T> = serde_json::from_slice(&body).map_err(|e| {
        ApiFailure::Transport(format!("HTTP {}: unreadable response: {}", status, e))
    })?;

    if parsed.ok {
        return parsed
            .result
            .ok_or_else(|| ApiFailure::Transport("response without result".into()));
    }

    if parsed.error_code == Some(429) || status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = parsed
            .parameters
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_AFTER);
        return Err(ApiFailure::RateLimited(retry_after));
    }

    Err(ApiFailure::Rejected(
        parsed
            .description
            .unwrap_or_else(|| format!("HTTP {}", status)),
    ))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

/// Request body streaming `file` while publishing the running byte count
fn counting_body(file: tokio::fs::File, sent_tx: watch::Sender<u64>) -> Body {
    let mut sent = 0u64;
    let stream = ReaderStream::new(file).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            sent += bytes.len() as u64;
            sent_tx.send_replace(sent);
        }
        chunk
    });
    Body::wrap_stream(stream)
}

/// Await `request`, forwarding upload progress from `sent_rx` as it changes
async fn drive_with_progress<F>(
    request: F,
    mut sent_rx: watch::Receiver<u64>,
    total: u64,
    progress: &mut dyn ProgressSink,
) -> reqwest::Result<reqwest::Response>
where
    F: Future<Output = reqwest::Result<reqwest::Response>>,
{
    tokio::pin!(request);
    loop {
        tokio::select! {
            result = &mut request => return result,
            changed = sent_rx.changed() => {
                if changed.is_err() {
                    // body fully streamed, only the response is left
                    return request.await;
                }
                let sent = *sent_rx.borrow_and_update();
                progress.on_progress(sent, total).await;
            }
        }
    }
}

/// [`Transport`] over the Telegram Bot HTTP API
///
/// Uploads go through `sendVideo`/`sendDocument` as multipart requests; the
/// incoming file is fetched with `getFile` and streamed to disk. The hosted
/// Bot API limits downloads to 20 MB and uploads to 50 MB; point
/// [`with_api_base`](Self::with_api_base) at a local Bot API server for larger
/// files.
///
/// # Examples
///
/// ```no_run
/// use archive_relay::transport::{BotApiTransport, Transport};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = BotApiTransport::new(std::env::var("BOT_TOKEN")?)?;
/// let status = transport.send_text(-1001234567890, "<b>hello</b>").await?;
/// transport.delete_message(&status).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BotApiTransport {
    client: reqwest::Client,
    api_base: Url,
    /// `<base>/bot<token>/`; method names are joined onto it
    method_base: Url,
    /// `<base>/file/bot<token>/`; file paths from getFile are joined onto it
    file_base: Url,
}

/// `base` with `segments` appended as a directory (trailing slash)
fn endpoint_base(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| invalid_api_base(base.as_str(), "cannot be a base URL"))?
        .pop_if_empty()
        .extend(segments)
        .push("");
    Ok(url)
}

fn invalid_api_base(api_base: &str, reason: impl std::fmt::Display) -> Error {
    Error::Config {
        message: format!("invalid Bot API base '{}': {}", api_base, reason),
        key: Some("api_base".into()),
    }
}

impl std::fmt::Debug for BotApiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApiTransport")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl BotApiTransport {
    /// Transport for `token` against the public Bot API
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Transport for `token` against a custom API base (local Bot API server, tests)
    ///
    /// The base may carry a path prefix, e.g. `http://localhost:8081/telegram`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `api_base` is not an absolute http(s) URL.
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let api_base = api_base.into();
        let base = Url::parse(&api_base).map_err(|e| invalid_api_base(&api_base, e))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid_api_base(&api_base, "scheme must be http or https"));
        }

        let bot_segment = format!("bot{}", token);
        let method_base = endpoint_base(&base, &[&bot_segment])?;
        let file_base = endpoint_base(&base, &["file", &bot_segment])?;

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_base: base,
            method_base,
            file_base,
        })
    }

    fn method_url(&self, method: &str) -> std::result::Result<Url, ApiFailure> {
        self.method_base
            .join(method)
            .map_err(|e| ApiFailure::Transport(format!("invalid method URL: {}", e)))
    }

    fn file_url(&self, file_path: &str) -> std::result::Result<Url, ApiFailure> {
        self.file_base
            .join(file_path.trim_start_matches('/'))
            .map_err(|e| ApiFailure::Transport(format!("invalid file URL: {}", e)))
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<T, ApiFailure> {
        let response = self
            .client
            .post(self.method_url(method)?)
            .timeout(CALL_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;

        parse_response(response).await
    }
}

#[async_trait]
impl Transport for BotApiTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageHandle> {
        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_notification": true,
            "disable_web_page_preview": true,
        });

        let message: ApiMessage = self
            .call_json("sendMessage", &body)
            .await
            .map_err(|f| f.into_transmission("message"))?;

        Ok(message.into())
    }

    async fn edit_text(&self, message: &MessageHandle, text: &str) -> Result<()> {
        let body = json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        match self.call_json::<serde_json::Value>("editMessageText", &body).await {
            Ok(_) => Ok(()),
            // Same text as before; the message already shows what we want
            Err(ApiFailure::Rejected(reason)) if reason.contains("message is not modified") => {
                Ok(())
            }
            Err(failure) => Err(failure.into_transmission("status message")),
        }
    }

    async fn delete_message(&self, message: &MessageHandle) -> Result<()> {
        let body = json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
        });

        self.call_json::<serde_json::Value>("deleteMessage", &body)
            .await
            .map_err(|f| f.into_transmission("message"))?;
        Ok(())
    }

    async fn download(
        &self,
        transfer: &IncomingTransfer,
        dest: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<u64> {
        let file_name = transfer.file_name.as_str();

        let file: ApiFile = self
            .call_json("getFile", &json!({ "file_id": transfer.file_ref }))
            .await
            .map_err(|f| f.into_download(file_name))?;

        let file_path = file.file_path.ok_or_else(|| {
            Error::Download(DownloadError::Transport {
                file: file_name.to_string(),
                reason: "no file_path returned, file may exceed the download limit".into(),
            })
        })?;

        let transport_error = |reason: String| {
            Error::Download(DownloadError::Transport {
                file: file_name.to_string(),
                reason,
            })
        };

        let url = self
            .file_url(&file_path)
            .map_err(|f| f.into_download(file_name))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(transport_error(format!("HTTP {}", response.status())));
        }

        let total = if transfer.declared_size > 0 {
            transfer.declared_size
        } else {
            file.file_size
                .or_else(|| response.content_length())
                .unwrap_or(0)
        };

        debug!(file = file_name, total, ?dest, "streaming incoming file");

        let mut out = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(e.to_string()))?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress.on_progress(written, total).await;
        }
        out.flush().await?;

        if transfer.declared_size > 0 && written != transfer.declared_size {
            return Err(Error::Download(DownloadError::SizeMismatch {
                file: file_name.to_string(),
                expected: transfer.declared_size,
                actual: written,
            }));
        }

        Ok(written)
    }

    async fn send_video(
        &self,
        chat_id: i64,
        video: &VideoUpload,
        progress: &mut dyn ProgressSink,
    ) -> Result<MessageHandle> {
        let name = file_name_of(&video.path);

        let total = tokio::fs::metadata(&video.path).await?.len();
        let file = tokio::fs::File::open(&video.path).await?;
        let thumbnail = tokio::fs::read(&video.thumbnail).await?;

        let (sent_tx, sent_rx) = watch::channel(0u64);
        let video_part =
            Part::stream_with_length(counting_body(file, sent_tx), total).file_name(name.clone());
        let thumbnail_part = Part::bytes(thumbnail).file_name(file_name_of(&video.thumbnail));

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", video.caption.clone())
            .text("parse_mode", "HTML")
            .text("duration", video.duration_secs.to_string())
            .text("width", video.width.to_string())
            .text("height", video.height.to_string())
            .text("supports_streaming", "true")
            .text("disable_notification", "true")
            .part("video", video_part)
            .part("thumbnail", thumbnail_part);

        let url = self
            .method_url("sendVideo")
            .map_err(|f| f.into_transmission(&name))?;
        let request = self.client.post(url).multipart(form).send();

        let response = drive_with_progress(request, sent_rx, total, progress)
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()).into_transmission(&name))?;

        let message: ApiMessage = parse_response(response)
            .await
            .map_err(|f| f.into_transmission(&name))?;

        progress.on_progress(total, total).await;
        Ok(message.into())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<MessageHandle> {
        let name = file_name_of(path);

        let length = tokio::fs::metadata(path).await?.len();
        let file = tokio::fs::File::open(path).await?;
        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
            .file_name(name.clone());

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .text("disable_notification", "true")
            .part("document", part);

        let url = self
            .method_url("sendDocument")
            .map_err(|f| f.into_transmission(&name))?;
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()).into_transmission(&name))?;

        let message: ApiMessage = parse_response(response)
            .await
            .map_err(|f| f.into_transmission(&name))?;

        Ok(message.into())
    }

    fn name(&self) -> &'static str {
        "bot-api"
    }
}
