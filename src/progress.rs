//! Throttled progress reporting
//!
//! Transports report raw byte counts through [`ProgressSink`]. The
//! [`ProgressThrottle`] turns those into edits of a single status message, at
//! most one per interval, and mirrors them on the event channel.

use crate::error::Result;
use crate::transport::Transport;
use crate::types::{Event, MessageHandle, RunId};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Receives byte-level progress from a transfer
#[async_trait]
pub trait ProgressSink: Send {
    /// `current` of `total` bytes have been transferred
    async fn on_progress(&mut self, current: u64, total: u64);
}

/// Percentage of `current` over `total`, 0 when the total is unknown
pub fn percent(current: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (current as f64 * 100.0 / total as f64).min(100.0)
}

/// Emission bookkeeping for one logical transfer
#[derive(Debug, Clone, Copy)]
pub struct ProgressState {
    last_emit: Instant,
}

impl ProgressState {
    /// State whose window starts at `at` (usually when the status message was posted)
    pub fn starting_at(at: Instant) -> Self {
        Self { last_emit: at }
    }

    /// When the last update was emitted
    pub fn last_emit(&self) -> Instant {
        self.last_emit
    }

    /// Decide whether to emit at `now`, recording `now` only if so
    pub fn tick(&mut self, now: Instant, interval: Duration) -> bool {
        if now.saturating_duration_since(self.last_emit) >= interval {
            self.last_emit = now;
            true
        } else {
            false
        }
    }
}

/// Direction of a throttled transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Incoming file being downloaded
    Download,
    /// Entry being uploaded
    Upload {
        /// File name of the entry
        entry: String,
    },
}

impl Direction {
    fn label(&self) -> &'static str {
        match self {
            Direction::Download => "Download",
            Direction::Upload { .. } => "Upload",
        }
    }
}

/// Status text shown for a transfer
pub fn status_text(direction: &Direction, percent: f64) -> String {
    format!("{} progress: {:.2}%", direction.label(), percent)
}

/// Rate-limited editor of a single status message
///
/// Created with [`ProgressThrottle::start`], which posts the `0%` message.
/// Dropped through [`ProgressThrottle::finish`], which deletes it.
pub struct ProgressThrottle<'a> {
    transport: &'a dyn Transport,
    status: MessageHandle,
    direction: Direction,
    interval: Duration,
    state: ProgressState,
    events: Option<(broadcast::Sender<Event>, RunId)>,
}

impl<'a> ProgressThrottle<'a> {
    /// Post the initial status message in `chat_id` and start throttling
    pub async fn start(
        transport: &'a dyn Transport,
        chat_id: i64,
        direction: Direction,
        interval: Duration,
    ) -> Result<Self> {
        let status = transport
            .send_text(chat_id, &format!("{} progress: 0%", direction.label()))
            .await?;

        Ok(Self {
            transport,
            status,
            direction,
            interval,
            state: ProgressState::starting_at(Instant::now()),
            events: None,
        })
    }

    /// Also publish emitted updates as events for `run_id`
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>, run_id: RunId) -> Self {
        self.events = Some((event_tx, run_id));
        self
    }

    /// The status message being edited
    pub fn status(&self) -> MessageHandle {
        self.status
    }

    /// Delete the status message
    ///
    /// A failed delete is logged, not returned; the transfer itself already
    /// finished.
    pub async fn finish(self) {
        if let Err(e) = self.transport.delete_message(&self.status).await {
            warn!(error = %e, message_id = self.status.message_id, "failed to delete status message");
        }
    }

    fn emit_event(&self, percent: f64) {
        let Some((tx, run_id)) = &self.events else {
            return;
        };
        let percent = percent as f32;
        let event = match &self.direction {
            Direction::Download => Event::Downloading {
                run_id: *run_id,
                percent,
            },
            Direction::Upload { entry } => Event::Transmitting {
                run_id: *run_id,
                entry: entry.clone(),
                percent,
            },
        };
        // no subscribers is fine
        tx.send(event).ok();
    }
}

#[async_trait]
impl ProgressSink for ProgressThrottle<'_> {
    async fn on_progress(&mut self, current: u64, total: u64) {
        if !self.state.tick(Instant::now(), self.interval) {
            return;
        }

        let pct = percent(current, total);
        debug!(current, total, percent = pct, "progress update");
        self.emit_event(pct);

        let text = status_text(&self.direction, pct);
        if let Err(e) = self.transport.edit_text(&self.status, &text).await {
            warn!(error = %e, "failed to edit status message");
        }
    }
}
