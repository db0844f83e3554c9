//! Per-run working areas
//!
//! Every run owns `working_root/run-<id>`. The directory is created fresh, so
//! two runs can never share one; a leftover from an earlier process just
//! moves allocation on to the next ID.
//!
//! Inside it, `files/` receives the download and whatever an archive expands
//! to, and `thumbnails/` holds the transient frames written by the media
//! probe. Keeping them apart means a thumbnail can never overwrite, or be
//! mistaken for, a file that came out of the archive.
//!
//! An area that is dropped without [`WorkingArea::remove`] having succeeded
//! deletes itself synchronously, so a run whose future is abandoned still
//! leaves nothing behind.

use crate::error::Result;
use crate::probe::thumbnail_path;
use crate::types::RunId;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Name used when the incoming file name has no usable component
const FALLBACK_FILE_NAME: &str = "download";

/// Subdirectory holding the download and the expanded archive
const FILES_DIR: &str = "files";

/// Subdirectory holding probe thumbnails
const THUMBNAILS_DIR: &str = "thumbnails";

/// Directory exclusively owned by one run
#[derive(Debug)]
pub struct WorkingArea {
    path: PathBuf,
    removed: bool,
}

impl WorkingArea {
    /// Allocate a run ID and create its directory under `root`
    pub async fn allocate(root: &Path) -> Result<(RunId, Self)> {
        loop {
            let run_id = RunId::next();
            let path = root.join(format!("run-{}", run_id));

            match tokio::fs::create_dir(&path).await {
                Ok(()) => {
                    // From here on the area cleans up after itself if
                    // anything below fails
                    let area = Self {
                        path,
                        removed: false,
                    };
                    tokio::fs::create_dir(area.files_dir()).await?;
                    tokio::fs::create_dir(area.thumbnails_dir()).await?;
                    debug!(run_id = run_id.get(), path = ?area.path, "created working area");
                    return Ok((run_id, area));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(?path, "working area already exists, trying next run id");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// The directory itself
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the download lands and archives are expanded
    pub fn files_dir(&self) -> PathBuf {
        self.path.join(FILES_DIR)
    }

    /// Where thumbnails are written
    pub fn thumbnails_dir(&self) -> PathBuf {
        self.path.join(THUMBNAILS_DIR)
    }

    /// Thumbnail location for a video inside [`files_dir`](Self::files_dir)
    pub fn thumbnail_for(&self, video: &Path) -> PathBuf {
        thumbnail_path(video, &self.thumbnails_dir())
    }

    /// Where the incoming file is written
    ///
    /// Only the final component of `file_name` is used, so a sender-supplied
    /// name cannot point outside the area.
    pub fn download_path(&self, file_name: &str) -> PathBuf {
        let name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(FALLBACK_FILE_NAME);
        self.files_dir().join(name)
    }

    /// Whether the directory is still on disk
    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Recursively delete the directory; already gone counts as success
    pub async fn remove(&mut self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.removed = true;
        Ok(())
    }
}

impl Drop for WorkingArea {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => warn!(path = ?self.path, "removed working area of an abandoned run"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(path = ?self.path, error = %e, "failed to remove working area"),
        }
    }
}
