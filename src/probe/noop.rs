//! No-op media probe for hosts without ffmpeg

use super::traits::{MediaProbe, ProbeCapabilities};
use crate::types::VideoMetadata;
use async_trait::async_trait;
use std::path::Path;

/// Media probe used when ffprobe/ffmpeg are unavailable
///
/// Every probe fails with `Error::NotSupported`, so video entries are handled
/// by the configured failure policy while documents are still delivered.
pub struct NoOpMediaProbe;

#[async_trait]
impl MediaProbe for NoOpMediaProbe {
    async fn probe(&self, _video: &Path, _thumbnail: &Path) -> crate::Result<VideoMetadata> {
        Err(crate::Error::NotSupported(
            "video probing requires ffprobe and ffmpeg. \
             Configure ffprobe_path/ffmpeg_path or ensure both are in PATH."
                .into(),
        ))
    }

    fn capabilities(&self) -> ProbeCapabilities {
        ProbeCapabilities {
            can_probe: false,
            can_thumbnail: false,
        }
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
