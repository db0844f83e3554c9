//! Run-scoped state threaded through the pipeline

use super::workspace::WorkingArea;
use crate::error::{Error, Result};
use crate::links::SessionLinks;
use crate::types::{EntryFailure, IncomingTransfer, RunId, Stage};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Cancellation tokens of the runs in flight
pub(crate) type ActiveRuns = Arc<Mutex<HashMap<RunId, CancellationToken>>>;

/// A run's entry in the active-run map
///
/// [`release`](Self::release) removes it when the run finishes normally. If
/// the registration is dropped instead, because the `ingest` future was
/// abandoned, the run's token is cancelled and the entry removed anyway.
pub(crate) struct RunRegistration {
    run_id: RunId,
    token: CancellationToken,
    active_runs: ActiveRuns,
    released: bool,
}

impl RunRegistration {
    pub(crate) async fn register(active_runs: &ActiveRuns, run_id: RunId) -> Self {
        let token = CancellationToken::new();
        active_runs.lock().await.insert(run_id, token.clone());
        Self {
            run_id,
            token,
            active_runs: Arc::clone(active_runs),
            released: false,
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub(crate) async fn release(mut self) {
        self.active_runs.lock().await.remove(&self.run_id);
        self.released = true;
    }
}

impl Drop for RunRegistration {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(run_id = self.run_id.get(), "run abandoned before it finished");
        self.token.cancel();

        if let Ok(mut active) = self.active_runs.try_lock() {
            active.remove(&self.run_id);
            return;
        }

        // The map is busy; finish on the runtime
        let active_runs = Arc::clone(&self.active_runs);
        let run_id = self.run_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    active_runs.lock().await.remove(&run_id);
                });
            }
            Err(_) => warn!(run_id = run_id.get(), "no runtime to deregister abandoned run"),
        }
    }
}

/// Applies the stage timeout and cancellation to every suspension point of a run
#[derive(Debug, Clone)]
pub(crate) struct StageGuard {
    run_id: RunId,
    token: CancellationToken,
    timeout: Option<Duration>,
}

impl StageGuard {
    pub(crate) fn new(run_id: RunId, token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            run_id,
            token,
            timeout,
        }
    }

    /// Drive `fut` unless the run is cancelled or the stage times out
    pub(crate) async fn run<T, F>(&self, stage: Stage, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limited = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| Error::Timeout {
                        stage,
                        after: limit,
                    })?,
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled { run_id: self.run_id }),
            result = limited => result,
        }
    }

    /// Sleep for `duration`, waking early with an error on cancellation
    pub(crate) async fn pause(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled { run_id: self.run_id }),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Everything one ingestion run owns
pub(crate) struct RunContext {
    pub(crate) run_id: RunId,
    pub(crate) transfer: IncomingTransfer,
    pub(crate) area: WorkingArea,
    pub(crate) links: SessionLinks,
    pub(crate) failures: Vec<EntryFailure>,
    pub(crate) transmitted: usize,
    /// Set when the entry loop stopped because of the abort policy; the
    /// failing entry has already been reported
    pub(crate) aborted_on_entry: bool,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) guard: StageGuard,
}

impl RunContext {
    pub(crate) fn new(
        run_id: RunId,
        transfer: IncomingTransfer,
        area: WorkingArea,
        guard: StageGuard,
    ) -> Self {
        Self {
            run_id,
            transfer,
            area,
            links: SessionLinks::new(),
            failures: Vec::new(),
            transmitted: 0,
            aborted_on_entry: false,
            started_at: Utc::now(),
            guard,
        }
    }

    /// Chat that receives entries, links and the done notice
    pub(crate) fn destination(&self) -> i64 {
        self.transfer.destination()
    }

    /// Chat the transfer came from; receives progress and failure notices
    pub(crate) fn source(&self) -> i64 {
        self.transfer.source_chat_id
    }
}
