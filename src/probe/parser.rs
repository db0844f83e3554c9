//! Parser for ffprobe JSON output

use crate::error::ProbeError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Suffix appended to a video's stem to name its thumbnail
pub const THUMBNAIL_SUFFIX: &str = "_thumbnail.jpg";

/// Container facts read from ffprobe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerInfo {
    /// Duration in (fractional) seconds
    pub duration: f64,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl ContainerInfo {
    /// Duration truncated to whole seconds
    pub fn duration_secs(&self) -> u64 {
        self.duration.trunc() as u64
    }

    /// Timestamp one quarter into the video, in seconds
    pub fn thumbnail_offset(&self) -> f64 {
        self.duration / 4.0
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

fn parse_seconds(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Parse `ffprobe -print_format json -show_format -show_streams -select_streams v:0`
///
/// The duration comes from the container format, falling back to the video
/// stream when the container does not report one.
pub fn parse_ffprobe_output(path: &Path, stdout: &[u8]) -> Result<ContainerInfo, ProbeError> {
    let output: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|e| ProbeError::Malformed {
            path: path.to_path_buf(),
            reason: format!("invalid ffprobe JSON: {}", e),
        })?;

    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| ProbeError::NoVideoStream {
            path: path.to_path_buf(),
        })?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(ProbeError::Malformed {
            path: path.to_path_buf(),
            reason: "video stream has no dimensions".into(),
        });
    };

    let duration = parse_seconds(output.format.as_ref().and_then(|f| f.duration.as_deref()))
        .or_else(|| parse_seconds(stream.duration.as_deref()))
        .ok_or_else(|| ProbeError::Malformed {
            path: path.to_path_buf(),
            reason: "no duration reported".into(),
        })?;

    Ok(ContainerInfo {
        duration,
        width,
        height,
    })
}

/// Thumbnail file for `video` inside `dir`: `<stem>_thumbnail.jpg`
pub fn thumbnail_path(video: &Path, dir: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!("{}{}", stem, THUMBNAIL_SUFFIX))
}
