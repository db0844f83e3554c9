//! Error types for archive-relay
//!
//! This module provides the error hierarchy for the ingestion pipeline:
//! - Stage-specific error types (Download, Extraction, Probe, Transmission)
//! - Run-level conditions (cancellation, stage timeouts, shutdown)
//! - Stage attribution used when reporting a failed entry back to the chat

use crate::types::{RunId, Stage};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for archive-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for archive-relay
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "video_extensions")
        key: Option<String>,
    },

    /// Acquiring the incoming file failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Expanding an archive failed
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Probing a video entry failed
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Sending an entry or a status message failed
    #[error("transmission error: {0}")]
    Transmission(#[from] TransmissionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was cancelled before it finished
    #[error("run {run_id} was cancelled")]
    Cancelled {
        /// The cancelled run
        run_id: RunId,
    },

    /// A pipeline stage exceeded the configured stage timeout
    #[error("{stage:?} stage timed out after {after:?}")]
    Timeout {
        /// The stage that timed out
        stage: Stage,
        /// The timeout that was exceeded
        after: Duration,
    },

    /// Shutdown in progress - not accepting new runs
    #[error("shutdown in progress: not accepting new transfers")]
    ShuttingDown,

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors raised while acquiring the incoming file
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The transport failed while streaming the file
    #[error("failed to download {file}: {reason}")]
    Transport {
        /// Original file name of the transfer
        file: String,
        /// The reason the transfer failed
        reason: String,
    },

    /// Fewer or more bytes arrived than the transfer declared
    #[error("download of {file} ended at {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Original file name of the transfer
        file: String,
        /// Declared size in bytes
        expected: u64,
        /// Bytes actually written
        actual: u64,
    },
}

/// Errors raised while expanding an archive
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extension is configured as an archive but no extractor handles it
    #[error("unsupported archive format '{extension}' for {archive}")]
    UnsupportedFormat {
        /// The archive file
        archive: PathBuf,
        /// The offending extension
        extension: String,
    },

    /// The archive could not be read or decompressed
    #[error("corrupt archive {archive}: {reason}")]
    Corrupt {
        /// The archive file
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// An extracted file ended up outside the working area
    #[error("archive {archive} wrote outside the working area: {path}")]
    UnsafePath {
        /// The archive file
        archive: PathBuf,
        /// The offending path
        path: PathBuf,
    },
}

/// Errors raised while probing a video entry
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe/ffmpeg exited unsuccessfully
    #[error("{tool} failed on {path}: {reason}")]
    ToolFailed {
        /// The video file
        path: PathBuf,
        /// The tool that failed
        tool: String,
        /// Captured stderr or spawn error
        reason: String,
    },

    /// The probe output could not be interpreted
    #[error("malformed probe output for {path}: {reason}")]
    Malformed {
        /// The video file
        path: PathBuf,
        /// What was missing or unparsable
        reason: String,
    },

    /// The container holds no video stream
    #[error("no video stream found in {path}")]
    NoVideoStream {
        /// The video file
        path: PathBuf,
    },

    /// Thumbnail extraction produced no image
    #[error("thumbnail extraction failed for {path}: {reason}")]
    ThumbnailFailed {
        /// The video file
        path: PathBuf,
        /// The reason extraction failed
        reason: String,
    },
}

/// Errors raised while sending messages or media
#[derive(Debug, Error)]
pub enum TransmissionError {
    /// The messaging service refused the request
    #[error("{file} was rejected: {reason}")]
    Rejected {
        /// The entry or message being sent
        file: String,
        /// The description returned by the service
        reason: String,
    },

    /// The messaging service asked us to slow down
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// How long the service asked us to wait
        retry_after: Duration,
    },

    /// The connection failed mid-request
    #[error("failed to send {file}: {reason}")]
    Transport {
        /// The entry or message being sent
        file: String,
        /// The reason the request failed
        reason: String,
    },
}

impl Error {
    /// The pipeline stage this error is attributed to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Download(_) => Some(Stage::Download),
            Error::Extraction(_) => Some(Stage::Expand),
            Error::Probe(_) => Some(Stage::Probe),
            Error::Transmission(_) => Some(Stage::Transmit),
            Error::Timeout { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether this error ends the whole run regardless of the failure policy
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Cancelled { .. } | Error::ShuttingDown | Error::Config { .. }
        )
    }
}
