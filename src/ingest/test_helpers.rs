//! In-memory transport and probe doubles shared by the crate's unit tests

use super::Ingestor;
use crate::config::Config;
use crate::error::{DownloadError, Error, ProbeError, Result, TransmissionError};
use crate::probe::{MediaProbe, ProbeCapabilities};
use crate::progress::ProgressSink;
use crate::transport::{Transport, VideoUpload};
use crate::types::{IncomingTransfer, MessageHandle, VideoMetadata};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// One call observed by [`RecordingTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    SendText {
        chat_id: i64,
        text: String,
    },
    EditText {
        message_id: i64,
        text: String,
    },
    Delete {
        message_id: i64,
    },
    Download {
        file_name: String,
    },
    SendVideo {
        chat_id: i64,
        file_name: String,
        caption: String,
        duration_secs: u64,
        thumbnail_present: bool,
    },
    SendDocument {
        chat_id: i64,
        file_name: String,
        caption: String,
    },
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Transport that records every call and serves a fixed payload
pub(crate) struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    next_message_id: AtomicI64,
    payload: Vec<u8>,
    fail_download: bool,
    download_delay: Duration,
    rejected: HashSet<String>,
    flaky_uploads: AtomicU32,
    stall_texts_containing: Option<String>,
    documents: Mutex<HashMap<String, Vec<u8>>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(100),
            payload: Vec::new(),
            fail_download: false,
            download_delay: Duration::ZERO,
            rejected: HashSet::new(),
            flaky_uploads: AtomicU32::new(0),
            stall_texts_containing: None,
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Bytes written by `download`
    pub(crate) fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn failing_download(mut self) -> Self {
        self.fail_download = true;
        self
    }

    pub(crate) fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    /// Uploads of `file_name` are refused by the service
    pub(crate) fn rejecting(mut self, file_name: &str) -> Self {
        self.rejected.insert(file_name.to_string());
        self
    }

    /// The next `n` uploads fail with a transient transport error
    pub(crate) fn with_flaky_uploads(self, n: u32) -> Self {
        self.flaky_uploads.store(n, Ordering::SeqCst);
        self
    }

    /// Text sends containing `pattern` hang for 30 seconds after being recorded
    pub(crate) fn stalling_texts_containing(mut self, pattern: &str) -> Self {
        self.stall_texts_containing = Some(pattern.to_string());
        self
    }

    /// Bytes of the document uploaded as `file_name`, read at upload time
    pub(crate) fn document_bytes(&self, file_name: &str) -> Option<Vec<u8>> {
        self.documents.lock().unwrap().get(file_name).cloned()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Texts sent to `chat_id`, in order
    pub(crate) fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendText { chat_id: id, text } if id == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    /// File names of uploaded videos and documents, in order
    pub(crate) fn uploads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendVideo { file_name, .. } | Call::SendDocument { file_name, .. } => {
                    Some(file_name)
                }
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn handle(&self, chat_id: i64) -> MessageHandle {
        MessageHandle {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
        }
    }

    fn check_upload(&self, file_name: &str) -> Result<()> {
        if self.rejected.contains(file_name) {
            return Err(TransmissionError::Rejected {
                file: file_name.to_string(),
                reason: "Request Entity Too Large".into(),
            }
            .into());
        }
        let flaky = self
            .flaky_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if flaky.is_ok() {
            return Err(TransmissionError::Transport {
                file: file_name.to_string(),
                reason: "connection reset".into(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageHandle> {
        self.record(Call::SendText {
            chat_id,
            text: text.to_string(),
        });
        if let Some(pattern) = &self.stall_texts_containing {
            if text.contains(pattern.as_str()) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        }
        Ok(self.handle(chat_id))
    }

    async fn edit_text(&self, message: &MessageHandle, text: &str) -> Result<()> {
        self.record(Call::EditText {
            message_id: message.message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, message: &MessageHandle) -> Result<()> {
        self.record(Call::Delete {
            message_id: message.message_id,
        });
        Ok(())
    }

    async fn download(
        &self,
        transfer: &IncomingTransfer,
        dest: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<u64> {
        self.record(Call::Download {
            file_name: transfer.file_name.clone(),
        });
        if !self.download_delay.is_zero() {
            tokio::time::sleep(self.download_delay).await;
        }
        if self.fail_download {
            return Err(DownloadError::Transport {
                file: transfer.file_name.clone(),
                reason: "connection reset by peer".into(),
            }
            .into());
        }

        tokio::fs::write(dest, &self.payload).await?;
        let len = self.payload.len() as u64;
        progress.on_progress(len, len).await;
        Ok(len)
    }

    async fn send_video(
        &self,
        chat_id: i64,
        video: &VideoUpload,
        progress: &mut dyn ProgressSink,
    ) -> Result<MessageHandle> {
        let file_name = file_name_of(&video.path);
        self.record(Call::SendVideo {
            chat_id,
            file_name: file_name.clone(),
            caption: video.caption.clone(),
            duration_secs: video.duration_secs,
            thumbnail_present: video.thumbnail.exists(),
        });
        self.check_upload(&file_name)?;

        let size = tokio::fs::metadata(&video.path).await?.len();
        progress.on_progress(size, size).await;
        Ok(self.handle(chat_id))
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<MessageHandle> {
        let file_name = file_name_of(path);
        self.record(Call::SendDocument {
            chat_id,
            file_name: file_name.clone(),
            caption: caption.to_string(),
        });
        self.check_upload(&file_name)?;

        let bytes = tokio::fs::read(path).await?;
        self.documents.lock().unwrap().insert(file_name, bytes);
        Ok(self.handle(chat_id))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Probe that writes a fake thumbnail and reports a fixed 60s 1280x720 video
pub(crate) struct ScriptedProbe {
    fail_on: HashSet<String>,
    delay: Duration,
}

impl ScriptedProbe {
    pub(crate) fn new() -> Self {
        Self {
            fail_on: HashSet::new(),
            delay: Duration::ZERO,
        }
    }

    /// Probing `file_name` fails with "no video stream"
    pub(crate) fn failing_on(mut self, file_name: &str) -> Self {
        self.fail_on.insert(file_name.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MediaProbe for ScriptedProbe {
    async fn probe(&self, video: &Path, thumbnail: &Path) -> Result<VideoMetadata> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on.contains(&file_name_of(video)) {
            return Err(Error::Probe(ProbeError::NoVideoStream {
                path: video.to_path_buf(),
            }));
        }

        tokio::fs::write(thumbnail, b"jpeg").await?;
        Ok(VideoMetadata {
            duration_secs: 60,
            width: 1280,
            height: 720,
            thumbnail: thumbnail.to_path_buf(),
        })
    }

    fn capabilities(&self) -> ProbeCapabilities {
        ProbeCapabilities {
            can_probe: true,
            can_thumbnail: true,
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// In-memory zip archive holding `files`
pub(crate) fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Config suited to tests: no pauses, short notices, fast retries
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.workspace.working_root = root.to_path_buf();
    config.delivery.entry_pause = Duration::ZERO;
    config.delivery.progress_interval = Duration::from_millis(1);
    config.notices.expanded_notice_ttl = Duration::from_millis(1);
    config.notices.done_notice_ttl = Duration::from_millis(1);
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.retry.jitter = false;
    config
}

/// Ingestor over the given doubles with its working root in a fresh temp dir
pub(crate) async fn create_test_ingestor(
    transport: Arc<RecordingTransport>,
    probe: ScriptedProbe,
    configure: impl FnOnce(&mut Config),
) -> (Ingestor, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    configure(&mut config);

    let ingestor = Ingestor::new(config, transport, Arc::new(probe))
        .await
        .unwrap();
    (ingestor, temp_dir)
}

/// Number of entries directly under `dir`
pub(crate) fn dir_entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
