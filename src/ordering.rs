//! Entry ordering
//!
//! Walks a run's working area, classifies every file as video or document
//! (dropping skipped extensions such as subtitles) and sorts the result by the
//! numeric prefix of each file name. Files without a prefix go last; ties keep
//! the walk order, which is file-name order within each directory.

use crate::config::ClassificationConfig;
use crate::error::{Error, Result};
use crate::types::{Entry, EntryKind, OrderKey};
use crate::utils::has_extension;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Pattern a file name must match to be renumbered: `"<digits>. <rest>"`
const RENUMBER_PATTERN: &str = r"^([0-9]+)\. (.+)$";

/// Derive the order key from the leading decimal digits of `file_name`
///
/// A prefix too large for `u64` saturates, so it still sorts before any
/// unnumbered name.
pub fn order_key(file_name: &str) -> OrderKey {
    let digits: &str = {
        let end = file_name
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(file_name.len());
        &file_name[..end]
    };

    if digits.is_empty() {
        return OrderKey::Unnumbered;
    }

    OrderKey::Numbered(digits.parse::<u64>().unwrap_or(u64::MAX))
}

/// Classify a file, or `None` when it is excluded from delivery
pub fn classify(path: &Path, config: &ClassificationConfig) -> Option<EntryKind> {
    if has_extension(path, &config.skipped_extensions) {
        None
    } else if has_extension(path, &config.video_extensions) {
        Some(EntryKind::Video)
    } else {
        Some(EntryKind::Document)
    }
}

/// Produces the ordered entry sequence for a working area
#[derive(Clone, Debug)]
pub struct EntryOrderer {
    classification: ClassificationConfig,
}

impl EntryOrderer {
    /// Create an orderer using the given classification rules
    pub fn new(classification: ClassificationConfig) -> Self {
        Self { classification }
    }

    /// Walk `working_dir` and return its entries in delivery order
    ///
    /// The walk runs on the blocking pool.
    pub async fn order(&self, working_dir: &Path) -> Result<Vec<Entry>> {
        let dir = working_dir.to_path_buf();
        let classification = self.classification.clone();
        tokio::task::spawn_blocking(move || order_blocking(&dir, &classification))
            .await
            .map_err(|e| Error::Other(format!("ordering task panicked: {}", e)))?
    }

    /// Rename `"<digits>. <rest>"` files to `"<position>. <rest>"`
    ///
    /// Positions are 1-based over the ordered sequence. Returns the entries
    /// with updated paths; entries that could not be renamed are returned
    /// unchanged.
    pub async fn renumber(&self, entries: Vec<Entry>) -> Result<Vec<Entry>> {
        tokio::task::spawn_blocking(move || renumber_blocking(entries))
            .await
            .map_err(|e| Error::Other(format!("renumbering task panicked: {}", e)))?
    }
}

/// Synchronous ordering used by [`EntryOrderer::order`]
pub fn order_blocking(working_dir: &Path, config: &ClassificationConfig) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();

    for dir_entry in WalkDir::new(working_dir).sort_by_file_name() {
        let dir_entry = dir_entry.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to walk {}: {}",
                working_dir.display(),
                e
            )))
        })?;

        if !dir_entry.file_type().is_file() {
            continue;
        }

        let path = dir_entry.into_path();
        let Some(kind) = classify(&path, config) else {
            debug!(?path, "skipping excluded file");
            continue;
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        entries.push(Entry {
            order_key: order_key(&file_name),
            file_name,
            path,
            kind,
            metadata: None,
        });
    }

    // sort_by_key is stable, ties keep walk order
    entries.sort_by_key(|e| e.order_key);

    Ok(entries)
}

fn renumber_blocking(entries: Vec<Entry>) -> Result<Vec<Entry>> {
    let pattern = Regex::new(RENUMBER_PATTERN)
        .map_err(|e| Error::Other(format!("invalid renumber pattern: {}", e)))?;

    let mut out = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let position = index as u64 + 1;
        out.push(renumber_one(&pattern, entry, position));
    }
    Ok(out)
}

fn renumber_one(pattern: &Regex, mut entry: Entry, position: u64) -> Entry {
    let Some(captures) = pattern.captures(&entry.file_name) else {
        warn!(entry = %entry.file_name, "name does not match \"<digits>. <rest>\", not renumbered");
        return entry;
    };
    let rest = &captures[2];

    let new_name = format!("{}. {}", position, rest);
    if new_name == entry.file_name {
        return entry;
    }

    let target: PathBuf = match entry.path.parent() {
        Some(parent) => parent.join(&new_name),
        None => PathBuf::from(&new_name),
    };

    if target.exists() {
        warn!(entry = %entry.file_name, target = %new_name, "target name taken, not renumbered");
        return entry;
    }

    if let Err(e) = std::fs::rename(&entry.path, &target) {
        warn!(entry = %entry.file_name, error = %e, "rename failed, not renumbered");
        return entry;
    }

    debug!(from = %entry.file_name, to = %new_name, "renumbered entry");
    entry.path = target;
    entry.file_name = new_name;
    entry.order_key = OrderKey::Numbered(position);
    entry
}
