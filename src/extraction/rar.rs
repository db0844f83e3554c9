use crate::error::{Error, ExtractionError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::shared::{extract_blocking, safe_member_path};

/// Archive extractor for RAR files
pub struct RarExtractor;

impl RarExtractor {
    fn corrupt(archive_path: &Path, reason: impl std::fmt::Display) -> Error {
        Error::Extraction(ExtractionError::Corrupt {
            archive: archive_path.to_path_buf(),
            reason: reason.to_string(),
        })
    }

    /// Extract every member of a RAR archive into `dest_path`
    ///
    /// Encrypted archives fail as corrupt; there is no password source.
    pub fn extract(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "attempting RAR extraction");

        std::fs::create_dir_all(dest_path)?;

        let processor = unrar::Archive::new(archive_path)
            .open_for_processing()
            .map_err(|e| Self::corrupt(archive_path, e))?;

        let mut extracted_files = Vec::new();

        let mut at_header = processor;
        loop {
            let at_file = match at_header.read_header() {
                Ok(Some(entry_processor)) => entry_processor,
                Ok(None) => break,
                Err(e) => return Err(Self::corrupt(archive_path, e)),
            };

            let header = at_file.entry();
            let Some(member) = safe_member_path(Path::new(&header.filename)) else {
                warn!(?archive_path, name = ?header.filename, "skipping entry with unsafe path");
                at_header = at_file
                    .skip()
                    .map_err(|e| Self::corrupt(archive_path, format!("failed to skip entry: {}", e)))?;
                continue;
            };

            let file_path = dest_path.join(&member);

            if header.is_directory() {
                std::fs::create_dir_all(&file_path)?;
                at_header = at_file.skip().map_err(|e| {
                    Self::corrupt(archive_path, format!("failed to skip directory: {}", e))
                })?;
            } else {
                if let Some(parent) = file_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                at_header = at_file
                    .extract_to(&file_path)
                    .map_err(|e| Self::corrupt(archive_path, e))?;
                extracted_files.push(file_path);
            }
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "RAR extraction successful"
        );

        Ok(extracted_files)
    }

    /// Extract on the blocking pool
    pub async fn extract_async(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        extract_blocking("RAR", Self::extract, archive_path, dest_path).await
    }
}
