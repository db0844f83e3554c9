//! Utility functions for file names, HTML captions and message sizing

use std::path::Path;

/// File name without its final extension
///
/// # Examples
///
/// ```
/// use archive_relay::utils::base_name;
///
/// assert_eq!(base_name("2. Intro.mp4"), "2. Intro");
/// assert_eq!(base_name("archive.tar.gz"), "archive.tar");
/// assert_eq!(base_name("README"), "README");
/// ```
#[must_use]
pub fn base_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

/// Lowercased extension of a path, without the dot
#[must_use]
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Check if a path's extension is one of `extensions` (case-insensitive, no dots)
#[must_use]
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Escape text for Telegram's HTML parse mode
///
/// Only `&`, `<`, `>` and `"` need escaping there.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Split `text` into chunks of at most `max_len` characters, preferring line breaks
///
/// Lines are never reordered. A single line longer than `max_len` is cut at
/// character boundaries. Empty input yields no chunks.
#[must_use]
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > max_len {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_len) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() {
            line_len
        } else {
            current_len + 1 + line_len
        };

        if needed > max_len {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks.retain(|c| !c.trim().is_empty());
    chunks
}
