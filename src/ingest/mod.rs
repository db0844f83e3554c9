//! Ingestion pipeline split into focused submodules.
//!
//! The [`Ingestor`] drives one run per incoming transfer:
//! - [`workspace`] - Per-run working areas
//! - [`context`] - Run-scoped state, stage timeouts and cancellation
//! - [`orchestration`] - Download, expansion, ordering and the entry loop
//! - [`delivery`] - Probing and sending a single entry
//! - [`finalization`] - Link flush, notices and cleanup
//! - [`lifecycle`] - Cancellation and shutdown

mod context;
mod delivery;
mod finalization;
mod lifecycle;
mod orchestration;
pub mod workspace;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use workspace::WorkingArea;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extraction::ArchiveExpander;
use crate::ordering::EntryOrderer;
use crate::probe::{MediaProbe, probe_from_config};
use crate::transport::Transport;
use crate::types::Event;
use context::ActiveRuns;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::broadcast;

/// Buffered events per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Relays incoming transfers into ordered channel posts
///
/// Cloneable; all state is shared. Each call to [`ingest`](Self::ingest) is
/// one independent run with its own working area, so runs may proceed
/// concurrently.
#[derive(Clone)]
pub struct Ingestor {
    pub(crate) config: Arc<Config>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) probe: Arc<dyn MediaProbe>,
    pub(crate) expander: ArchiveExpander,
    pub(crate) orderer: EntryOrderer,
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Cancellation tokens of runs in flight
    pub(crate) active_runs: ActiveRuns,
    /// Cleared on shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl Ingestor {
    /// Create an ingestor with an explicit media probe
    ///
    /// Validates the configuration and creates the working root.
    pub async fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn MediaProbe>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.working_root())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create working root '{}': {}",
                        config.working_root().display(),
                        e
                    ),
                ))
            })?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let caps = probe.capabilities();
        tracing::info!(
            transport = transport.name(),
            probe = probe.name(),
            can_probe = caps.can_probe,
            can_thumbnail = caps.can_thumbnail,
            "ingestor initialized"
        );

        Ok(Self {
            expander: ArchiveExpander::from_config(&config.classification),
            orderer: EntryOrderer::new(config.classification.clone()),
            config: Arc::new(config),
            transport,
            probe,
            event_tx,
            active_runs: ActiveRuns::default(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Create an ingestor whose probe is picked from the configured tools
    ///
    /// Uses ffprobe/ffmpeg when found, otherwise a probe that fails every
    /// video entry.
    pub async fn with_configured_probe(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let probe = probe_from_config(&config.tools);
        Self::new(config, transport, probe).await
    }

    /// Subscribe to run events
    ///
    /// Every subscriber receives all events. A subscriber falling more than
    /// 1000 events behind receives `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use archive_relay::{Config, Ingestor};
    /// use archive_relay::transport::BotApiTransport;
    /// use std::sync::Arc;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let transport = Arc::new(BotApiTransport::new("123:token")?);
    ///     let ingestor = Ingestor::with_configured_probe(Config::default(), transport).await?;
    ///
    ///     let mut events = ingestor.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "ingest event");
    ///         }
    ///     });
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // send() only fails without receivers
        self.event_tx.send(event).ok();
    }
}
