//! Video metadata and thumbnail extraction
//!
//! The [`MediaProbe`] trait is the seam between the delivery loop and the
//! tooling that decodes video. [`FfmpegProbe`] shells out to `ffprobe` for
//! duration and frame size and to `ffmpeg` for a frame one quarter into the
//! video. [`NoOpMediaProbe`] stands in when those binaries are missing.

mod cli;
mod noop;
mod parser;
mod traits;

pub use cli::FfmpegProbe;
pub use noop::NoOpMediaProbe;
pub use parser::{ContainerInfo, THUMBNAIL_SUFFIX, parse_ffprobe_output, thumbnail_path};
pub use traits::{MediaProbe, ProbeCapabilities};

use crate::config::ToolsConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Pick the probe implementation for the configured tools
///
/// Falls back to [`NoOpMediaProbe`] when ffprobe or ffmpeg cannot be found.
pub fn probe_from_config(tools: &ToolsConfig) -> Arc<dyn MediaProbe> {
    match FfmpegProbe::from_config(tools) {
        Some(probe) => {
            info!(?probe, "using ffmpeg media probe");
            Arc::new(probe)
        }
        None => {
            warn!("ffprobe/ffmpeg not found, video entries cannot be probed");
            Arc::new(NoOpMediaProbe)
        }
    }
}
