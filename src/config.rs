//! Configuration types for archive-relay

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Where runs keep their transient files
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Root under which every run creates its own `run-<id>` directory (default: "./download")
    #[serde(default = "default_working_root")]
    pub working_root: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            working_root: default_working_root(),
        }
    }
}

/// How files found in the working area are classified
///
/// Extensions are matched case-insensitively and are written without the dot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Extensions sent as videos (default: mp4, mkv, avi, mov, flv)
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    /// Extensions never transmitted (default: srt)
    #[serde(default = "default_skipped_extensions")]
    pub skipped_extensions: Vec<String>,

    /// Extensions treated as archives to expand (default: zip, rar, 7z)
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            video_extensions: default_video_extensions(),
            skipped_extensions: default_skipped_extensions(),
            archive_extensions: default_archive_extensions(),
        }
    }
}

/// What happens to the rest of a run when one entry fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryFailurePolicy {
    /// Report the entry and move on to the next one (default)
    #[default]
    Continue,
    /// Stop the entry loop at the first failure; cleanup still runs
    Abort,
}

/// Attribution line appended to video captions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    /// Display name
    pub name: String,
    /// Link target (e.g. "tg://user?id=42")
    pub url: String,
}

/// Outbound delivery behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Pause after each entry to respect rate limits (default: 6 seconds)
    #[serde(default = "default_entry_pause", with = "duration_serde")]
    pub entry_pause: Duration,

    /// Minimum time between two progress edits of the same status message (default: 5 seconds)
    #[serde(default = "default_progress_interval", with = "duration_serde")]
    pub progress_interval: Duration,

    /// Base of message permalinks (default: "https://t.me/c")
    #[serde(default = "default_permalink_base")]
    pub permalink_base: String,

    /// Attribution appended to video captions (default: none)
    #[serde(default)]
    pub attribution: Option<Attribution>,

    /// Post a title card for the incoming file and list it first (default: false)
    #[serde(default)]
    pub announce_title: bool,

    /// Rename "<n>. <name>" files to their position in the ordered sequence (default: false)
    #[serde(default)]
    pub renumber_entries: bool,

    /// Continue or abort after a failed entry (default: continue)
    #[serde(default)]
    pub failure_policy: EntryFailurePolicy,

    /// Longest text message the transport accepts, in characters (default: 4096)
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            entry_pause: default_entry_pause(),
            progress_interval: default_progress_interval(),
            permalink_base: default_permalink_base(),
            attribution: None,
            announce_title: false,
            renumber_entries: false,
            failure_policy: EntryFailurePolicy::default(),
            max_message_len: default_max_message_len(),
        }
    }
}

/// Lifetimes of transient notices (serialized as milliseconds)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoticeConfig {
    /// How long the "archive expanded" notice stays visible (default: 500 ms)
    #[serde(default = "default_expanded_notice_ttl", with = "millis_serde")]
    pub expanded_notice_ttl: Duration,

    /// How long the "done" notice stays visible (default: 2 seconds)
    #[serde(default = "default_done_notice_ttl", with = "millis_serde")]
    pub done_notice_ttl: Duration,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            expanded_notice_ttl: default_expanded_notice_ttl(),
            done_notice_ttl: default_done_notice_ttl(),
        }
    }
}

/// Per-stage time limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Upper bound for any single suspension point (default: 1 hour, None = unbounded)
    #[serde(default = "default_stage_timeout", with = "optional_duration_serde")]
    pub stage_timeout: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stage_timeout: default_stage_timeout(),
        }
    }
}

/// Retry configuration for transient send failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// External tool paths (ffprobe, ffmpeg)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffprobe executable (auto-detected if None)
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: None,
            ffmpeg_path: None,
            search_path: true,
        }
    }
}

/// Main configuration for the [`Ingestor`](crate::Ingestor)
///
/// Sub-configs are flattened so the JSON form stays a single flat object,
/// except `retry` which is nested.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Working area location
    #[serde(flatten)]
    pub workspace: WorkspaceConfig,

    /// Entry classification
    #[serde(flatten)]
    pub classification: ClassificationConfig,

    /// Delivery behavior
    #[serde(flatten)]
    pub delivery: DeliveryConfig,

    /// Transient notices
    #[serde(flatten)]
    pub notices: NoticeConfig,

    /// Stage timeouts
    #[serde(flatten)]
    pub timeouts: TimeoutConfig,

    /// Send retries
    #[serde(default)]
    pub retry: RetryConfig,

    /// External binaries
    #[serde(flatten)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Root directory for per-run working areas
    pub fn working_root(&self) -> &PathBuf {
        &self.workspace.working_root
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let c = &self.classification;
        if c.video_extensions.is_empty() {
            return Err(config_error(
                "at least one video extension is required",
                "video_extensions",
            ));
        }
        if c.archive_extensions.is_empty() {
            return Err(config_error(
                "at least one archive extension is required",
                "archive_extensions",
            ));
        }
        if let Some(ext) = c.video_extensions.iter().find(|v| {
            c.skipped_extensions
                .iter()
                .any(|s| s.eq_ignore_ascii_case(v))
        }) {
            return Err(config_error(
                format!("extension '{ext}' is both a video and skipped"),
                "skipped_extensions",
            ));
        }
        if let Some(ext) = c
            .video_extensions
            .iter()
            .chain(&c.skipped_extensions)
            .chain(&c.archive_extensions)
            .find(|e| e.starts_with('.') || e.is_empty())
        {
            return Err(config_error(
                format!("extension '{ext}' must be non-empty and written without a dot"),
                "extensions",
            ));
        }
        if self.delivery.progress_interval.is_zero() {
            return Err(config_error(
                "progress interval must be greater than zero",
                "progress_interval",
            ));
        }
        if self.delivery.max_message_len == 0 {
            return Err(config_error(
                "max message length must be greater than zero",
                "max_message_len",
            ));
        }
        if self.timeouts.stage_timeout.is_some_and(|t| t.is_zero()) {
            return Err(config_error(
                "stage timeout must be greater than zero when set",
                "stage_timeout",
            ));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

fn default_working_root() -> PathBuf {
    PathBuf::from("./download")
}

fn default_video_extensions() -> Vec<String> {
    ["mp4", "mkv", "avi", "mov", "flv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_skipped_extensions() -> Vec<String> {
    vec!["srt".to_string()]
}

fn default_archive_extensions() -> Vec<String> {
    ["zip", "rar", "7z"].iter().map(|s| s.to_string()).collect()
}

fn default_entry_pause() -> Duration {
    Duration::from_secs(6)
}

fn default_progress_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_permalink_base() -> String {
    "https://t.me/c".to_string()
}

fn default_max_message_len() -> usize {
    4096
}

fn default_expanded_notice_ttl() -> Duration {
    Duration::from_millis(500)
}

fn default_done_notice_ttl() -> Duration {
    Duration::from_secs(2)
}

fn default_stage_timeout() -> Option<Duration> {
    Some(Duration::from_secs(3600))
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
