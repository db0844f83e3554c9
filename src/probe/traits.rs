//! Traits and types for video probing

use crate::types::VideoMetadata;
use async_trait::async_trait;
use std::path::Path;

/// Capabilities of a media probe implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeCapabilities {
    /// Can read duration and dimensions
    pub can_probe: bool,
    /// Can extract a thumbnail frame
    pub can_thumbnail: bool,
}

/// Extracts delivery metadata from a video entry
///
/// Implementations read the container's duration and frame size and write a
/// single representative frame to the path chosen by the caller, who owns it
/// afterwards and deletes it once the video has been sent.
///
/// # Examples
///
/// ```no_run
/// use archive_relay::probe::{FfmpegProbe, MediaProbe};
/// use archive_relay::probe::thumbnail_path;
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let Some(probe) = FfmpegProbe::from_path() else {
///     return Ok(());
/// };
///
/// let video = Path::new("1. Welcome.mp4");
/// let meta = probe.probe(video, &thumbnail_path(video, Path::new("/tmp"))).await?;
/// println!("{}s {}x{} -> {}", meta.duration_secs, meta.width, meta.height, meta.thumbnail.display());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Probe `video` and write its thumbnail to `thumbnail`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The external tool cannot be run or exits unsuccessfully
    /// - The file holds no decodable video stream
    /// - The thumbnail could not be written
    /// - Probing is not supported (for stub implementations)
    async fn probe(&self, video: &Path, thumbnail: &Path) -> crate::Result<VideoMetadata>;

    /// Query capabilities of this probe
    fn capabilities(&self) -> ProbeCapabilities;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
