//! Messaging transport boundary
//!
//! The pipeline talks to the chat service only through [`Transport`]: plain
//! status messages that are edited and deleted, the streamed download of the
//! incoming file, and the outbound video/document uploads whose message IDs
//! become permalinks. [`BotApiTransport`] implements it over the Telegram Bot
//! HTTP API.

mod bot_api;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use bot_api::{BotApiTransport, DEFAULT_API_BASE};

use crate::error::Result;
use crate::progress::ProgressSink;
use crate::types::{IncomingTransfer, MessageHandle};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A video entry ready to be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoUpload {
    /// The video file
    pub path: PathBuf,
    /// Duration in whole seconds
    pub duration_secs: u64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Thumbnail image shown before playback
    pub thumbnail: PathBuf,
    /// HTML caption
    pub caption: String,
}

/// Chat messaging operations used by the pipeline
///
/// Every text is sent with HTML formatting. Implementations report transfer
/// progress through the given [`ProgressSink`] as bytes move.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post a text message
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageHandle>;

    /// Replace the text of an earlier message
    async fn edit_text(&self, message: &MessageHandle, text: &str) -> Result<()>;

    /// Delete an earlier message
    async fn delete_message(&self, message: &MessageHandle) -> Result<()>;

    /// Stream the incoming file to `dest`, returning the bytes written
    async fn download(
        &self,
        transfer: &IncomingTransfer,
        dest: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<u64>;

    /// Upload a video with its metadata and thumbnail
    async fn send_video(
        &self,
        chat_id: i64,
        video: &VideoUpload,
        progress: &mut dyn ProgressSink,
    ) -> Result<MessageHandle>;

    /// Upload a file as a generic document
    async fn send_document(&self, chat_id: i64, path: &Path, caption: &str)
    -> Result<MessageHandle>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
