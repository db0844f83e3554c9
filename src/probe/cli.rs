//! Media probe backed by the ffprobe and ffmpeg binaries

use super::parser::parse_ffprobe_output;
use super::traits::{MediaProbe, ProbeCapabilities};
use crate::config::ToolsConfig;
use crate::error::ProbeError;
use crate::types::VideoMetadata;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Media probe running external `ffprobe` and `ffmpeg` processes
///
/// # Examples
///
/// ```no_run
/// use archive_relay::probe::FfmpegProbe;
/// use std::path::PathBuf;
///
/// // Explicit paths
/// let probe = FfmpegProbe::new(PathBuf::from("/usr/bin/ffprobe"), PathBuf::from("/usr/bin/ffmpeg"));
///
/// // Or auto-discover from PATH
/// let probe = FfmpegProbe::from_path();
/// ```
#[derive(Debug, Clone)]
pub struct FfmpegProbe {
    ffprobe: PathBuf,
    ffmpeg: PathBuf,
}

impl FfmpegProbe {
    /// Create a probe with explicit binary paths
    pub fn new(ffprobe: PathBuf, ffmpeg: PathBuf) -> Self {
        Self { ffprobe, ffmpeg }
    }

    /// Find both binaries in PATH
    pub fn from_path() -> Option<Self> {
        let ffprobe = which::which("ffprobe").ok()?;
        let ffmpeg = which::which("ffmpeg").ok()?;
        Some(Self::new(ffprobe, ffmpeg))
    }

    /// Resolve binaries from explicit config paths, then PATH if allowed
    pub fn from_config(tools: &ToolsConfig) -> Option<Self> {
        let resolve = |explicit: &Option<PathBuf>, name: &str| -> Option<PathBuf> {
            match explicit {
                Some(path) => Some(path.clone()),
                None if tools.search_path => which::which(name).ok(),
                None => None,
            }
        };

        let ffprobe = resolve(&tools.ffprobe_path, "ffprobe")?;
        let ffmpeg = resolve(&tools.ffmpeg_path, "ffmpeg")?;
        Some(Self::new(ffprobe, ffmpeg))
    }

    async fn run_ffprobe(&self, video: &Path) -> Result<Vec<u8>, ProbeError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .args(["-select_streams", "v:0"])
            .arg(video)
            .output()
            .await
            .map_err(|e| ProbeError::ToolFailed {
                path: video.to_path_buf(),
                tool: "ffprobe".into(),
                reason: format!("failed to execute: {}", e),
            })?;

        if !output.status.success() {
            return Err(ProbeError::ToolFailed {
                path: video.to_path_buf(),
                tool: "ffprobe".into(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    async fn run_ffmpeg_frame(
        &self,
        video: &Path,
        at_secs: f64,
        thumbnail: &Path,
    ) -> Result<(), ProbeError> {
        let output = Command::new(&self.ffmpeg)
            .args(["-y", "-v", "error", "-ss"])
            .arg(format!("{:.3}", at_secs))
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1"])
            .arg(thumbnail)
            .output()
            .await
            .map_err(|e| ProbeError::ThumbnailFailed {
                path: video.to_path_buf(),
                reason: format!("failed to execute ffmpeg: {}", e),
            })?;

        if !output.status.success() {
            return Err(ProbeError::ThumbnailFailed {
                path: video.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !tokio::fs::try_exists(thumbnail).await.unwrap_or(false) {
            return Err(ProbeError::ThumbnailFailed {
                path: video.to_path_buf(),
                reason: "ffmpeg wrote no frame".into(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl MediaProbe for FfmpegProbe {
    async fn probe(&self, video: &Path, thumbnail: &Path) -> crate::Result<VideoMetadata> {
        let stdout = self.run_ffprobe(video).await?;
        let info = parse_ffprobe_output(video, &stdout)?;

        self.run_ffmpeg_frame(video, info.thumbnail_offset(), thumbnail)
            .await?;

        debug!(
            ?video,
            duration = info.duration_secs(),
            width = info.width,
            height = info.height,
            "probed video"
        );

        Ok(VideoMetadata {
            duration_secs: info.duration_secs(),
            width: info.width,
            height: info.height,
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
        "ffmpeg"
    }
}
