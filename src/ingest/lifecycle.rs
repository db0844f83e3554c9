//! Cancellation and shutdown coordination.

use crate::error::Result;
use crate::types::{Event, RunId};
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::Ingestor;

/// How long shutdown waits for cancelled runs to finish their cleanup
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl Ingestor {
    /// Cancel a run in flight
    ///
    /// The run stops at its next suspension point and still removes its
    /// working area. Returns `false` if no such run is active.
    pub async fn cancel(&self, run_id: RunId) -> bool {
        let active = self.active_runs.lock().await;
        match active.get(&run_id) {
            Some(token) => {
                tracing::info!(run_id = run_id.get(), "cancelling run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// IDs of runs currently in flight
    pub async fn active_runs(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.active_runs.lock().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Whether new transfers are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    /// Gracefully shut down
    ///
    /// 1. Stops accepting new transfers
    /// 2. Cancels every active run
    /// 3. Waits up to 30 seconds for their cleanup to finish
    /// 4. Emits [`Event::Shutdown`]
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.cancel_all().await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_runs()).await {
            Ok(()) => tracing::info!("All active runs finished"),
            Err(_) => tracing::warn!("Timeout waiting for active runs, proceeding with shutdown"),
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn cancel_all(&self) {
        let active = self.active_runs.lock().await;
        tracing::debug!(active_count = active.len(), "Cancelling all active runs");
        for (id, token) in active.iter() {
            tracing::debug!(run_id = id.get(), "Signaling cancellation");
            token.cancel();
        }
    }

    async fn wait_for_active_runs(&self) {
        loop {
            let active_count = self.active_runs.lock().await.len();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "Waiting for active runs to finish");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
