//! Archive expansion
//!
//! Turns a downloaded transfer into the set of files that will be delivered.
//! ZIP, RAR and 7z archives are expanded in place inside the run's working
//! area and the archive itself is removed afterwards. Anything else passes
//! through untouched.

mod rar;
mod sevenz;
mod shared;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use rar::RarExtractor;
pub use sevenz::SevenZipExtractor;
pub use shared::{detect_archive_type, is_archive};
pub use zip::ZipExtractor;

use crate::config::ClassificationConfig;
use crate::error::{Error, ExtractionError, Result};
use crate::types::ArchiveType;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Expands archives according to the configured archive extensions
#[derive(Clone, Debug)]
pub struct ArchiveExpander {
    archive_extensions: Vec<String>,
}

impl ArchiveExpander {
    /// Create an expander recognising the given archive extensions (without dots)
    pub fn new(archive_extensions: Vec<String>) -> Self {
        Self { archive_extensions }
    }

    /// Build from the classification section of the config
    pub fn from_config(config: &ClassificationConfig) -> Self {
        Self::new(config.archive_extensions.clone())
    }

    /// Whether `path` is treated as an archive
    pub fn is_archive(&self, path: &Path) -> bool {
        is_archive(path, &self.archive_extensions)
    }

    /// Expand `source` into `dest`.
    ///
    /// Non-archives come back as `vec![source]` and nothing is touched. For an
    /// archive the extracted files are returned and the archive file is
    /// deleted once extraction succeeded.
    ///
    /// # Errors
    /// * [`ExtractionError::UnsupportedFormat`] when the extension is configured
    ///   as an archive but no extractor exists for it
    /// * [`ExtractionError::Corrupt`] when the archive cannot be read
    /// * [`Error::Io`] when the archive cannot be removed afterwards
    pub async fn expand(&self, source: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
        if !self.is_archive(source) {
            debug!(?source, "not an archive, passing through");
            return Ok(vec![source.to_path_buf()]);
        }

        let archive_type = detect_archive_type(source).ok_or_else(|| {
            Error::Extraction(ExtractionError::UnsupportedFormat {
                archive: source.to_path_buf(),
                extension: crate::utils::extension_of(source).unwrap_or_default(),
            })
        })?;

        info!(?source, ?dest, ?archive_type, "expanding archive");

        let files = extract_archive(archive_type, source, dest).await?;

        tokio::fs::remove_file(source).await?;
        debug!(?source, "removed expanded archive");

        Ok(files)
    }
}

/// Route an archive to the extractor for its type
pub async fn extract_archive(
    archive_type: ArchiveType,
    archive_path: &Path,
    dest_path: &Path,
) -> Result<Vec<PathBuf>> {
    match archive_type {
        ArchiveType::Rar => RarExtractor::extract_async(archive_path, dest_path).await,
        ArchiveType::SevenZip => SevenZipExtractor::extract_async(archive_path, dest_path).await,
        ArchiveType::Zip => ZipExtractor::extract_async(archive_path, dest_path).await,
    }
}
