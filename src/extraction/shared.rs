use crate::error::{Error, ExtractionError, Result};
use crate::types::ArchiveType;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

/// Run a synchronous extractor on the blocking pool.
///
/// Shared by the ZIP, RAR and 7z extractors so decompression never stalls the
/// async runtime.
pub(crate) async fn extract_blocking(
    format_name: &'static str,
    extract_fn: fn(&Path, &Path) -> Result<Vec<PathBuf>>,
    archive_path: &Path,
    dest_path: &Path,
) -> Result<Vec<PathBuf>> {
    let archive_owned = archive_path.to_path_buf();
    let dest_owned = dest_path.to_path_buf();

    spawn_blocking(move || extract_fn(&archive_owned, &dest_owned))
        .await
        .map_err(|e| {
            Error::Extraction(ExtractionError::Corrupt {
                archive: archive_path.to_path_buf(),
                reason: format!("{} extraction task panicked: {}", format_name, e),
            })
        })?
}

/// Detect archive type by file extension
///
/// Supports RAR (.rar, .r00), 7z (.7z), and ZIP (.zip) formats.
pub fn detect_archive_type(path: &Path) -> Option<ArchiveType> {
    let ext = path.extension()?.to_str()?.to_lowercase();

    match ext.as_str() {
        "rar" | "r00" => Some(ArchiveType::Rar),
        "7z" => Some(ArchiveType::SevenZip),
        "zip" => Some(ArchiveType::Zip),
        _ => None,
    }
}

/// Check if a file is an archive based on its extension
///
/// # Arguments
/// * `path` - Path to the file to check
/// * `archive_extensions` - List of extensions to treat as archives (without dots)
pub fn is_archive(path: &Path, archive_extensions: &[String]) -> bool {
    crate::utils::has_extension(path, archive_extensions)
}

/// Recursively list every regular file under `dir`, in file-name order
pub(crate) fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to read directory entry: {}",
                e
            )))
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Files under `dir` that are not in `before`
pub(crate) fn new_files_since(dir: &Path, before: &HashSet<PathBuf>) -> Result<Vec<PathBuf>> {
    Ok(list_files(dir)?
        .into_iter()
        .filter(|p| !before.contains(p))
        .collect())
}

/// Validate that everything under `dest_path` resolves inside it.
///
/// Catches symlinks an extractor may have materialised pointing out of the
/// working area.
pub(crate) fn validate_extracted_paths(archive_path: &Path, dest_path: &Path) -> Result<()> {
    let canonical_dest = dest_path.canonicalize().map_err(|e| {
        Error::Io(std::io::Error::other(format!(
            "failed to canonicalize destination path: {}",
            e
        )))
    })?;

    for entry in WalkDir::new(dest_path).min_depth(1) {
        let entry = entry.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to read directory entry: {}",
                e
            )))
        })?;
        let canonical = entry.path().canonicalize().map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to canonicalize extracted path: {}",
                e
            )))
        })?;

        if !canonical.starts_with(&canonical_dest) {
            return Err(Error::Extraction(ExtractionError::UnsafePath {
                archive: archive_path.to_path_buf(),
                path: canonical,
            }));
        }
    }
    Ok(())
}

/// Relative form of an archive member name, or `None` when it would escape
/// the destination (absolute, `..`, or empty)
pub(crate) fn safe_member_path(name: &Path) -> Option<PathBuf> {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}
