//! End-of-run work that happens whatever the outcome.

use super::Ingestor;
use super::context::RunContext;
use crate::error::{Error, Result};
use crate::types::{Event, RunReport, Stage};
use crate::utils::{escape_html, split_message};
use chrono::Utc;
use tracing::{debug, error, info, warn};

impl Ingestor {
    /// Report, post the collected links, announce completion and remove the
    /// working area
    ///
    /// Never fails: every step logs its own errors so the remaining steps
    /// (cleanup above all) still run. A cancelled run posts nothing and goes
    /// straight to cleanup.
    pub(super) async fn finalize(&self, ctx: &mut RunContext, outcome: &Result<()>) -> RunReport {
        let links = ctx.links.as_slice().to_vec();

        if ctx.guard.is_cancelled() {
            info!(
                run_id = ctx.run_id.get(),
                unposted_links = links.len(),
                "run cancelled, cleaning up"
            );
        } else {
            if let Err(e) = outcome {
                self.report_run_error(ctx, e).await;
            }

            self.post_links(ctx).await;

            if outcome.is_ok() {
                let text = format!("Done uploading {}", escape_html(&ctx.transfer.file_name));
                self.transient_notice(ctx.destination(), &text, self.config.notices.done_notice_ttl)
                    .await;
            }
        }

        match ctx.area.remove().await {
            Ok(()) => {
                debug!(run_id = ctx.run_id.get(), path = ?ctx.area.path(), "working area removed");
                self.emit_event(Event::Cleaned { run_id: ctx.run_id });
            }
            Err(e) => {
                error!(
                    run_id = ctx.run_id.get(),
                    path = ?ctx.area.path(),
                    error = %e,
                    "failed to remove working area"
                );
            }
        }

        RunReport {
            run_id: ctx.run_id,
            file_name: ctx.transfer.file_name.clone(),
            links,
            transmitted: ctx.transmitted,
            failures: ctx.failures.clone(),
            started_at: ctx.started_at,
            finished_at: Utc::now(),
        }
    }

    /// Tell the source chat about a run-level failure
    ///
    /// An abort caused by a failed entry was already reported for that entry,
    /// and a cancelled run has nobody waiting for the message.
    async fn report_run_error(&self, ctx: &RunContext, e: &Error) {
        if ctx.aborted_on_entry || matches!(e, Error::Cancelled { .. } | Error::ShuttingDown) {
            return;
        }
        self.report_failure(ctx.source(), &ctx.transfer.file_name, e)
            .await;
    }

    /// Send the collected links as one message, split when it is too long
    ///
    /// Each send runs under the stage timeout and stops on cancellation, so a
    /// stalled post cannot hold up cleanup or shutdown.
    async fn post_links(&self, ctx: &mut RunContext) {
        if ctx.links.is_empty() {
            debug!(run_id = ctx.run_id.get(), "no links to post");
            return;
        }

        let count = ctx.links.len();
        let text = ctx.links.flush();
        let chunks = split_message(&text, self.config.delivery.max_message_len);
        let guard = ctx.guard.clone();
        let destination = ctx.destination();

        for chunk in &chunks {
            let sent = guard
                .run(Stage::Finalize, self.send_text_with_retry(destination, chunk))
                .await;
            if let Err(e) = sent {
                warn!(run_id = ctx.run_id.get(), error = %e, "failed to post links");
                return;
            }
        }

        info!(
            run_id = ctx.run_id.get(),
            links = count,
            messages = chunks.len(),
            "posted links"
        );
    }
}
