use crate::error::{Error, ExtractionError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::shared::extract_blocking;

/// Archive extractor for ZIP files
pub struct ZipExtractor;

impl ZipExtractor {
    /// Extract a single ZIP entry to disk, creating directories as needed
    fn extract_zip_entry(
        mut file: zip::read::ZipFile,
        dest_path: &Path,
        archive_path: &Path,
    ) -> Result<Option<PathBuf>> {
        let file_path = match file.enclosed_name() {
            Some(path) => dest_path.join(path),
            None => {
                warn!(?archive_path, name = file.name(), "skipping entry with unsafe path");
                return Ok(None);
            }
        };

        if file.is_dir() {
            std::fs::create_dir_all(&file_path)?;
            return Ok(None);
        }

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut outfile = std::fs::File::create(&file_path)?;
        std::io::copy(&mut file, &mut outfile).map_err(|e| {
            Error::Extraction(ExtractionError::Corrupt {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to extract {}: {}", file_path.display(), e),
            })
        })?;

        Ok(Some(file_path))
    }

    /// Extract every member of a ZIP archive into `dest_path`
    pub fn extract(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "attempting ZIP extraction");

        std::fs::create_dir_all(dest_path)?;

        let file = std::fs::File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            Error::Extraction(ExtractionError::Corrupt {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to read ZIP archive: {}", e),
            })
        })?;

        let mut extracted_files = Vec::new();

        for i in 0..archive.len() {
            let file = archive.by_index(i).map_err(|e| {
                Error::Extraction(ExtractionError::Corrupt {
                    archive: archive_path.to_path_buf(),
                    reason: format!("failed to read ZIP entry {}: {}", i, e),
                })
            })?;

            if let Some(file_path) = Self::extract_zip_entry(file, dest_path, archive_path)? {
                extracted_files.push(file_path);
            }
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "ZIP extraction successful"
        );

        Ok(extracted_files)
    }

    /// Extract on the blocking pool
    pub async fn extract_async(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        extract_blocking("ZIP", Self::extract, archive_path, dest_path).await
    }
}
