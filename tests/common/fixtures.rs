//! Archive fixtures and a media probe that needs no ffmpeg

use archive_relay::{Config, MediaProbe, ProbeCapabilities, VideoMetadata};
use async_trait::async_trait;
use std::io::{Cursor, Write};
use std::path::Path;
use std::time::Duration;

/// Chat the test transfers arrive in
pub const SOURCE_CHAT: i64 = -1001234567890;

/// Files of a small course archive, deliberately out of order
pub const COURSE_FILES: &[(&str, &[u8])] = &[
    ("2. Intro.mp4", b"intro video bytes"),
    ("1. Welcome.mp4", b"welcome video bytes"),
    ("1. Welcome.srt", b"1\n00:00:00,000 --> 00:00:02,000\nWelcome\n"),
    ("3. Slides.pdf", b"%PDF-1.4 slides"),
];

/// Build a zip archive in memory
pub fn zip_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in files {
        writer
            .start_file(*name, options)
            .expect("Failed to start zip entry");
        writer.write_all(data).expect("Failed to write zip entry");
    }
    writer
        .finish()
        .expect("Failed to finish zip archive")
        .into_inner()
}

/// Config for integration runs: working root in `root`, no pauses, fast retries
pub fn fast_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.workspace.working_root = root.to_path_buf();
    config.delivery.entry_pause = Duration::ZERO;
    config.delivery.progress_interval = Duration::from_millis(10);
    config.notices.expanded_notice_ttl = Duration::from_millis(1);
    config.notices.done_notice_ttl = Duration::from_millis(1);
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.jitter = false;
    config
}

/// Media probe reporting a fixed 90 second 1920x1080 video
pub struct StubProbe;

#[async_trait]
impl MediaProbe for StubProbe {
    async fn probe(&self, _video: &Path, thumbnail: &Path) -> archive_relay::Result<VideoMetadata> {
        tokio::fs::write(thumbnail, b"\xFF\xD8\xFF\xD9").await?;
        Ok(VideoMetadata {
            duration_secs: 90,
            width: 1920,
            height: 1080,
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
        "stub"
    }
}
