//! Permalinks and the per-run link list

use crate::types::MessageHandle;
use crate::utils::escape_html;

/// Prefix the Bot API puts in front of supergroup and channel IDs
const CHANNEL_ID_PREFIX: &str = "-100";

/// Chat ID as it appears in a `t.me/c/...` link
///
/// Channel and supergroup IDs lose their `-100` prefix; any other ID uses its
/// absolute value.
pub fn chat_id_suffix(chat_id: i64) -> String {
    let raw = chat_id.to_string();
    match raw.strip_prefix(CHANNEL_ID_PREFIX) {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => chat_id.unsigned_abs().to_string(),
    }
}

/// Deep link to a sent message: `<base>/<chat id suffix>/<message id>`
pub fn permalink(base: &str, message: &MessageHandle) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        chat_id_suffix(message.chat_id),
        message.message_id
    )
}

/// Bold HTML hyperlink with an escaped caption
pub fn hyperlink(link: &str, caption: &str) -> String {
    format!(
        "<b><a href=\"{}\">{}</a></b>",
        escape_html(link),
        escape_html(caption)
    )
}

/// Hyperlinks collected during one run, in transmission order
#[derive(Debug, Default, Clone)]
pub struct SessionLinks {
    links: Vec<String>,
}

impl SessionLinks {
    /// Empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a formatted link
    pub fn append(&mut self, link: impl Into<String>) {
        self.links.push(link.into());
    }

    /// Number of collected links
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether nothing has been collected
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Collected links in order
    pub fn as_slice(&self) -> &[String] {
        &self.links
    }

    /// Join all links with newlines and reset to empty
    pub fn flush(&mut self) -> String {
        let joined = self.links.join("\n");
        self.links.clear();
        joined
    }
}
