//! # archive-relay
//!
//! Relay an uploaded file, or every file inside an uploaded archive, into a
//! chat as an ordered series of posts.
//!
//! ## How a run works
//!
//! Each incoming transfer gets its own working area. The file is streamed to
//! disk while a status message in the source chat shows the progress. Zip,
//! RAR and 7z archives are expanded in place; everything else passes
//! through as a single entry. Entries are sorted by the number their file
//! name starts with, then sent one by one: videos with duration, frame size
//! and a thumbnail, everything else as a document. Once the last entry is
//! out, a single message with a link to every post is sent to the
//! destination chat and the working area is removed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use archive_relay::transport::BotApiTransport;
//! use archive_relay::{Config, IncomingTransfer, Ingestor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BotApiTransport::new("123456:bot-token")?);
//!     let ingestor = Ingestor::with_configured_probe(Config::default(), transport).await?;
//!
//!     let mut events = ingestor.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let transfer = IncomingTransfer::new(-1001234567890, "course.zip", 0, "BQACAgQAAxkBAAI");
//!     let report = ingestor.ingest(transfer).await?;
//!     println!("sent {} entries", report.transmitted);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Archive expansion
pub mod extraction;
/// The ingestion pipeline
pub mod ingest;
/// Permalinks and the per-run link list
pub mod links;
/// Entry classification and ordering
pub mod ordering;
/// Video metadata and thumbnails
pub mod probe;
/// Throttled progress reporting
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Messaging transport
pub mod transport;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Attribution, Config, EntryFailurePolicy};
pub use error::{
    DownloadError, Error, ExtractionError, ProbeError, Result, TransmissionError,
};
pub use ingest::Ingestor;
pub use probe::{FfmpegProbe, MediaProbe, NoOpMediaProbe, ProbeCapabilities};
pub use transport::{BotApiTransport, Transport, VideoUpload};
pub use types::{
    Entry, EntryFailure, EntryKind, Event, IncomingTransfer, MessageHandle, OrderKey, RunId,
    RunReport, Stage, VideoMetadata,
};

/// Wait for a termination signal, then shut the ingestor down.
///
/// Runs in flight are cancelled and get up to 30 seconds to remove their
/// working areas.
///
/// - **Unix:** SIGTERM or SIGINT
/// - **Other platforms:** Ctrl+C
///
/// # Example
///
/// ```no_run
/// use archive_relay::transport::BotApiTransport;
/// use archive_relay::{Config, Ingestor, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = Arc::new(BotApiTransport::new("123456:bot-token")?);
///     let ingestor = Ingestor::with_configured_probe(Config::default(), transport).await?;
///
///     run_with_shutdown(ingestor).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(ingestor: Ingestor) -> Result<()> {
    wait_for_signal().await;
    ingestor.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; fall back to ctrl_c
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, using ctrl_c");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
