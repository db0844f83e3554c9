//! Core types for archive-relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counter backing [`RunId::next`]
static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for one ingestion run
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl RunId {
    /// Allocate the next run identifier for this process
    pub fn next() -> Self {
        Self(NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RunId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Streaming the incoming file to disk
    Download,
    /// Expanding an archive into the working area
    Expand,
    /// Walking and sorting the working area
    Order,
    /// Extracting video metadata and thumbnail
    Probe,
    /// Sending an entry to the destination chat
    Transmit,
    /// Posting links, notices and removing the working area
    Finalize,
}

/// Archive type detected by file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    /// RAR archive (.rar, .r00)
    Rar,
    /// 7-Zip archive (.7z)
    SevenZip,
    /// ZIP archive (.zip)
    Zip,
}

/// A message previously sent through the transport
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    /// Chat the message lives in
    pub chat_id: i64,
    /// Message identifier within that chat
    pub message_id: i64,
}

/// One file handed to the pipeline by the messaging transport
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncomingTransfer {
    /// Chat the document was posted in
    pub source_chat_id: i64,
    /// Chat entries are relayed to (defaults to the source chat)
    #[serde(default)]
    pub destination_chat_id: Option<i64>,
    /// Original file name as declared by the sender
    pub file_name: String,
    /// Declared size in bytes (0 when unknown)
    pub declared_size: u64,
    /// Transport-specific handle used to stream the bytes (e.g. a Bot API file_id)
    pub file_ref: String,
    /// On-disk location once downloaded
    #[serde(skip)]
    pub local_path: Option<PathBuf>,
}

impl IncomingTransfer {
    /// Create a transfer that relays back into the chat it came from
    pub fn new(
        source_chat_id: i64,
        file_name: impl Into<String>,
        declared_size: u64,
        file_ref: impl Into<String>,
    ) -> Self {
        Self {
            source_chat_id,
            destination_chat_id: None,
            file_name: file_name.into(),
            declared_size,
            file_ref: file_ref.into(),
            local_path: None,
        }
    }

    /// Chat that receives the relayed entries
    pub fn destination(&self) -> i64 {
        self.destination_chat_id.unwrap_or(self.source_chat_id)
    }

    /// File name without its final extension
    pub fn base_name(&self) -> &str {
        crate::utils::base_name(&self.file_name)
    }
}

/// Classification of an entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Sent with duration, dimensions and a thumbnail
    Video,
    /// Sent as a generic file
    Document,
}

/// Sort key derived from a file name's leading digits
///
/// `Unnumbered` sorts after every `Numbered` key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKey {
    /// The leading digit run of the file name
    Numbered(u64),
    /// No leading digits
    Unnumbered,
}

/// Metadata derived from a video entry by the media probe
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Duration in whole seconds (truncated)
    pub duration_secs: u64,
    /// Native frame width in pixels
    pub width: u32,
    /// Native frame height in pixels
    pub height: u32,
    /// Transient thumbnail image next to the video
    pub thumbnail: PathBuf,
}

/// One unit to be transmitted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Location inside the working area
    pub path: PathBuf,
    /// File name component of `path`
    pub file_name: String,
    /// Video or document
    pub kind: EntryKind,
    /// Sort key derived from `file_name`
    pub order_key: OrderKey,
    /// Attached by the media probe for video entries
    #[serde(default)]
    pub metadata: Option<VideoMetadata>,
}

impl Entry {
    /// Caption text: the file name without its extension
    pub fn caption(&self) -> &str {
        crate::utils::base_name(&self.file_name)
    }

    /// Whether this entry is sent as a video
    pub fn is_video(&self) -> bool {
        self.kind == EntryKind::Video
    }

    /// Location inside the working area
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// An entry that could not be delivered
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFailure {
    /// File name of the entry
    pub entry: String,
    /// Stage the failure is attributed to
    pub stage: Option<Stage>,
    /// Error message
    pub error: String,
}

/// Outcome of one ingestion run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// The run
    pub run_id: RunId,
    /// Original file name of the incoming transfer
    pub file_name: String,
    /// Hyperlinks posted in the consolidated message, in transmission order
    pub links: Vec<String>,
    /// Number of entries successfully transmitted
    pub transmitted: usize,
    /// Entries that failed
    pub failures: Vec<EntryFailure>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished (after cleanup)
    pub finished_at: DateTime<Utc>,
}

/// Event emitted during the ingestion lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run accepted an incoming transfer
    RunStarted {
        /// Run ID
        run_id: RunId,
        /// Original file name
        file_name: String,
    },

    /// Inbound progress update
    Downloading {
        /// Run ID
        run_id: RunId,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
    },

    /// Incoming file fully written to disk
    DownloadComplete {
        /// Run ID
        run_id: RunId,
        /// Bytes written
        bytes: u64,
    },

    /// Archive expansion started
    Expanding {
        /// Run ID
        run_id: RunId,
        /// Archive file name
        archive: String,
    },

    /// Archive expansion finished
    ExpandComplete {
        /// Run ID
        run_id: RunId,
        /// Number of files produced
        files: usize,
    },

    /// Working area walked and sorted
    EntriesOrdered {
        /// Run ID
        run_id: RunId,
        /// Number of entries to transmit
        total: usize,
    },

    /// Probing a video entry
    Probing {
        /// Run ID
        run_id: RunId,
        /// Entry file name
        entry: String,
    },

    /// Outbound progress update
    Transmitting {
        /// Run ID
        run_id: RunId,
        /// Entry file name
        entry: String,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
    },

    /// Entry delivered
    EntryTransmitted {
        /// Run ID
        run_id: RunId,
        /// Entry file name
        entry: String,
        /// Permalink of the sent message
        link: String,
    },

    /// Entry could not be delivered
    EntryFailed {
        /// Run ID
        run_id: RunId,
        /// Entry file name
        entry: String,
        /// Error message
        error: String,
    },

    /// Run finished its entry loop
    RunComplete {
        /// Run ID
        run_id: RunId,
        /// Entries delivered
        transmitted: usize,
        /// Entries that failed
        failed: usize,
    },

    /// Run aborted
    RunFailed {
        /// Run ID
        run_id: RunId,
        /// Error message
        error: String,
    },

    /// Working area removed
    Cleaned {
        /// Run ID
        run_id: RunId,
    },

    /// Ingestor shutting down
    Shutdown,
}
