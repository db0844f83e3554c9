use crate::error::{Error, ExtractionError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::shared::{extract_blocking, list_files, new_files_since, validate_extracted_paths};

/// Archive extractor for 7z files
pub struct SevenZipExtractor;

impl SevenZipExtractor {
    /// Extract every member of a 7z archive into `dest_path`
    ///
    /// `sevenz_rust` does not report what it wrote, so the produced files are
    /// the difference between the destination before and after decompression.
    pub fn extract(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "attempting 7z extraction");

        std::fs::create_dir_all(dest_path)?;
        let before: HashSet<PathBuf> = list_files(dest_path)?.into_iter().collect();

        sevenz_rust::decompress_file(archive_path, dest_path).map_err(|e| {
            Error::Extraction(ExtractionError::Corrupt {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to extract 7z archive: {}", e),
            })
        })?;

        validate_extracted_paths(archive_path, dest_path)?;
        let extracted_files = new_files_since(dest_path, &before)?;

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "7z extraction successful"
        );
        Ok(extracted_files)
    }

    /// Extract on the blocking pool
    pub async fn extract_async(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        extract_blocking("7z", Self::extract, archive_path, dest_path).await
    }
}
