//! Run orchestration: download, expand, order, then deliver each entry.

use super::Ingestor;
use super::context::{RunContext, RunRegistration, StageGuard};
use super::workspace::WorkingArea;
use crate::config::EntryFailurePolicy;
use crate::error::{Error, Result};
use crate::links::{hyperlink, permalink};
use crate::progress::{Direction, ProgressThrottle};
use crate::types::{EntryFailure, Event, IncomingTransfer, RunReport, Stage};
use crate::utils::escape_html;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

/// Notice posted after an archive has been expanded
const EXPANDED_NOTICE: &str = "The archive has been expanded!";

impl Ingestor {
    /// Relay one incoming transfer
    ///
    /// Downloads the file into a fresh working area, expands it if it is an
    /// archive, sends every entry in order to the destination chat and posts
    /// the collected links. The working area is removed before this returns,
    /// whatever the outcome. Dropping the returned future abandons the run:
    /// it is deregistered and its working area removed on the spot.
    ///
    /// # Errors
    ///
    /// * [`Error::ShuttingDown`] when called after [`shutdown`](Self::shutdown)
    /// * Download or extraction failures
    /// * An entry failure under [`EntryFailurePolicy::Abort`]
    /// * [`Error::Cancelled`] or [`Error::Timeout`]
    ///
    /// Entry failures under [`EntryFailurePolicy::Continue`] are listed in
    /// the returned [`RunReport`] instead.
    pub async fn ingest(&self, transfer: IncomingTransfer) -> Result<RunReport> {
        let (run_id, mut area) = WorkingArea::allocate(self.config.working_root()).await?;
        let registration = RunRegistration::register(&self.active_runs, run_id).await;

        // Checked once registered: a shutdown that started earlier has
        // cleared the flag, a later one finds this run in the map
        if !self.accepting_new.load(Ordering::SeqCst) {
            registration.release().await;
            if let Err(e) = area.remove().await {
                warn!(run_id = run_id.get(), error = %e, "failed to remove working area");
            }
            return Err(Error::ShuttingDown);
        }

        let guard = StageGuard::new(
            run_id,
            registration.token(),
            self.config.timeouts.stage_timeout,
        );

        info!(
            run_id = run_id.get(),
            file = %transfer.file_name,
            source = transfer.source_chat_id,
            destination = transfer.destination(),
            "starting run"
        );
        self.emit_event(Event::RunStarted {
            run_id,
            file_name: transfer.file_name.clone(),
        });

        let mut ctx = RunContext::new(run_id, transfer, area, guard);
        let outcome = self.run_stages(&mut ctx).await;
        let report = self.finalize(&mut ctx, &outcome).await;

        registration.release().await;

        match outcome {
            Ok(()) => {
                info!(
                    run_id = run_id.get(),
                    transmitted = report.transmitted,
                    failed = report.failures.len(),
                    "run complete"
                );
                self.emit_event(Event::RunComplete {
                    run_id,
                    transmitted: report.transmitted,
                    failed: report.failures.len(),
                });
                Ok(report)
            }
            Err(e) => {
                error!(run_id = run_id.get(), error = %e, "run failed");
                self.emit_event(Event::RunFailed {
                    run_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_stages(&self, ctx: &mut RunContext) -> Result<()> {
        if self.config.delivery.announce_title {
            self.announce_title(ctx).await?;
        }

        let downloaded = self.download_stage(ctx).await?;
        let produced = self.expand_stage(ctx, &downloaded).await?;
        debug!(run_id = ctx.run_id.get(), files = produced, "working area populated");

        let guard = ctx.guard.clone();
        let mut entries = guard
            .run(Stage::Order, self.orderer.order(&ctx.area.files_dir()))
            .await?;
        if self.config.delivery.renumber_entries {
            entries = guard
                .run(Stage::Order, self.orderer.renumber(entries))
                .await?;
        }

        info!(run_id = ctx.run_id.get(), total = entries.len(), "entries ordered");
        self.emit_event(Event::EntriesOrdered {
            run_id: ctx.run_id,
            total: entries.len(),
        });

        let last = entries.len().saturating_sub(1);
        for (index, mut entry) in entries.into_iter().enumerate() {
            match self.deliver_entry(ctx, &mut entry).await {
                Ok(link) => {
                    ctx.links.append(hyperlink(&link, entry.caption()));
                    ctx.transmitted += 1;
                    info!(run_id = ctx.run_id.get(), entry = %entry.file_name, %link, "entry transmitted");
                    self.emit_event(Event::EntryTransmitted {
                        run_id: ctx.run_id,
                        entry: entry.file_name.clone(),
                        link,
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.record_entry_failure(ctx, &entry.file_name, &e).await;
                    if self.config.delivery.failure_policy == EntryFailurePolicy::Abort {
                        ctx.aborted_on_entry = true;
                        return Err(e);
                    }
                }
            }

            if index < last {
                guard.pause(self.config.delivery.entry_pause).await?;
            }
        }

        Ok(())
    }

    /// Post the title card and record its link first
    async fn announce_title(&self, ctx: &mut RunContext) -> Result<()> {
        let title = ctx.transfer.base_name().to_string();
        let text = format!(".\n\n<b>{}</b>\n\n.", escape_html(&title));

        let guard = ctx.guard.clone();
        let handle = guard
            .run(Stage::Transmit, self.send_text_with_retry(ctx.source(), &text))
            .await?;

        let link = permalink(&self.config.delivery.permalink_base, &handle);
        // The blank line separates the title from the entry links
        ctx.links.append(format!("{}\n", hyperlink(&link, &title)));
        Ok(())
    }

    async fn download_stage(&self, ctx: &mut RunContext) -> Result<std::path::PathBuf> {
        let dest = ctx.area.download_path(&ctx.transfer.file_name);
        let guard = ctx.guard.clone();

        let mut throttle = ProgressThrottle::start(
            self.transport.as_ref(),
            ctx.source(),
            Direction::Download,
            self.config.delivery.progress_interval,
        )
        .await?
        .with_events(self.event_tx.clone(), ctx.run_id);

        let result = guard
            .run(
                Stage::Download,
                self.transport.download(&ctx.transfer, &dest, &mut throttle),
            )
            .await;
        throttle.finish().await;
        let bytes = result?;

        info!(run_id = ctx.run_id.get(), bytes, ?dest, "download complete");
        self.emit_event(Event::DownloadComplete {
            run_id: ctx.run_id,
            bytes,
        });
        ctx.transfer.local_path = Some(dest.clone());
        Ok(dest)
    }

    /// Expand the download if it is an archive; returns how many files it produced
    async fn expand_stage(&self, ctx: &mut RunContext, downloaded: &std::path::Path) -> Result<usize> {
        if !self.expander.is_archive(downloaded) {
            debug!(run_id = ctx.run_id.get(), "not an archive, skipping expansion");
            return Ok(1);
        }

        self.emit_event(Event::Expanding {
            run_id: ctx.run_id,
            archive: ctx.transfer.file_name.clone(),
        });

        let guard = ctx.guard.clone();
        let files = guard
            .run(
                Stage::Expand,
                self.expander.expand(downloaded, &ctx.area.files_dir()),
            )
            .await?;

        info!(run_id = ctx.run_id.get(), files = files.len(), "archive expanded");
        self.emit_event(Event::ExpandComplete {
            run_id: ctx.run_id,
            files: files.len(),
        });
        ctx.transfer.local_path = None;

        self.transient_notice(
            ctx.source(),
            EXPANDED_NOTICE,
            self.config.notices.expanded_notice_ttl,
        )
        .await;

        Ok(files.len())
    }

    async fn record_entry_failure(&self, ctx: &mut RunContext, entry: &str, e: &Error) {
        warn!(run_id = ctx.run_id.get(), entry, error = %e, "entry failed");

        ctx.failures.push(EntryFailure {
            entry: entry.to_string(),
            stage: e.stage(),
            error: e.to_string(),
        });
        self.emit_event(Event::EntryFailed {
            run_id: ctx.run_id,
            entry: entry.to_string(),
            error: e.to_string(),
        });
        self.report_failure(ctx.source(), entry, e).await;
    }
}
