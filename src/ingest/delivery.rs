//! Delivering a single entry, plus the text sends shared by the pipeline.

use super::Ingestor;
use super::context::RunContext;
use crate::config::Attribution;
use crate::error::{Error, Result};
use crate::links::permalink;
use crate::progress::{Direction, ProgressThrottle};
use crate::retry::send_with_retry;
use crate::transport::VideoUpload;
use crate::types::{Entry, Event, MessageHandle, RunId, Stage};
use crate::utils::escape_html;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Bold caption for a video, with the attribution link underneath when configured
pub(crate) fn video_caption(caption: &str, attribution: Option<&Attribution>) -> String {
    match attribution {
        Some(a) => format!(
            "<b>{}\n\n<a href='{}'>{}</a></b>",
            escape_html(caption),
            escape_html(&a.url),
            escape_html(&a.name)
        ),
        None => format!("<b>{}</b>", escape_html(caption)),
    }
}

/// Bold caption for a document
pub(crate) fn document_caption(caption: &str) -> String {
    format!("<b>{}</b>", escape_html(caption))
}

/// Text posted to the source chat when an entry or the run fails
pub(crate) fn failure_text(subject: &str, error: &Error) -> String {
    format!(
        "Failed to deliver <b>{}</b>: {}",
        escape_html(subject),
        escape_html(&error.to_string())
    )
}

/// Best-effort removal of a transient thumbnail
async fn remove_thumbnail(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(?path, "removed thumbnail"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(?path, error = %e, "failed to remove thumbnail"),
    }
}

impl Ingestor {
    /// Probe (for videos) and send one entry, returning its permalink
    pub(super) async fn deliver_entry(&self, ctx: &RunContext, entry: &mut Entry) -> Result<String> {
        let handle = if entry.is_video() {
            self.deliver_video(ctx, entry).await?
        } else {
            let caption = document_caption(entry.caption());
            ctx.guard
                .run(
                    Stage::Transmit,
                    self.send_document_with_retry(ctx.destination(), entry.path(), &caption),
                )
                .await?
        };

        Ok(permalink(&self.config.delivery.permalink_base, &handle))
    }

    async fn deliver_video(&self, ctx: &RunContext, entry: &mut Entry) -> Result<MessageHandle> {
        self.emit_event(Event::Probing {
            run_id: ctx.run_id,
            entry: entry.file_name.clone(),
        });

        let thumbnail = ctx.area.thumbnail_for(entry.path());
        let metadata = match ctx
            .guard
            .run(Stage::Probe, self.probe.probe(entry.path(), &thumbnail))
            .await
        {
            Ok(metadata) => metadata,
            Err(e) => {
                // ffmpeg may have left a partial image behind
                remove_thumbnail(&thumbnail).await;
                return Err(e);
            }
        };
        debug!(
            entry = %entry.file_name,
            duration = metadata.duration_secs,
            width = metadata.width,
            height = metadata.height,
            "probed video"
        );

        let upload = VideoUpload {
            path: entry.path.clone(),
            duration_secs: metadata.duration_secs,
            width: metadata.width,
            height: metadata.height,
            thumbnail: metadata.thumbnail.clone(),
            caption: video_caption(
                entry.caption(),
                self.config.delivery.attribution.as_ref(),
            ),
        };
        entry.metadata = Some(metadata);

        let result = ctx
            .guard
            .run(
                Stage::Transmit,
                self.send_video_with_retry(ctx, &upload, &entry.file_name),
            )
            .await;
        remove_thumbnail(&upload.thumbnail).await;
        result
    }

    /// Upload a video, posting a fresh upload status message for every attempt
    async fn send_video_with_retry(
        &self,
        ctx: &RunContext,
        upload: &VideoUpload,
        entry: &str,
    ) -> Result<MessageHandle> {
        let transport = self.transport.as_ref();
        let events = &self.event_tx;
        let interval = self.config.delivery.progress_interval;
        let status_chat = ctx.source();
        let destination = ctx.destination();
        let run_id: RunId = ctx.run_id;

        send_with_retry(&self.config.retry, move || async move {
            let mut throttle = ProgressThrottle::start(
                transport,
                status_chat,
                Direction::Upload {
                    entry: entry.to_string(),
                },
                interval,
            )
            .await?
            .with_events(events.clone(), run_id);

            let result = transport
                .send_video(destination, upload, &mut throttle)
                .await;
            throttle.finish().await;
            result
        })
        .await
    }

    async fn send_document_with_retry(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
    ) -> Result<MessageHandle> {
        let transport = self.transport.as_ref();
        send_with_retry(&self.config.retry, move || {
            transport.send_document(chat_id, path, caption)
        })
        .await
    }

    /// Send an HTML text message, retrying transient failures
    pub(super) async fn send_text_with_retry(&self, chat_id: i64, text: &str) -> Result<MessageHandle> {
        let transport = self.transport.as_ref();
        send_with_retry(&self.config.retry, move || transport.send_text(chat_id, text)).await
    }

    /// Post a notice and delete it again after `ttl`
    ///
    /// Failures are logged only; notices never fail a run.
    pub(super) async fn transient_notice(&self, chat_id: i64, text: &str, ttl: Duration) {
        let handle = match self.send_text_with_retry(chat_id, text).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(chat_id, error = %e, "failed to post notice");
                return;
            }
        };

        tokio::time::sleep(ttl).await;

        if let Err(e) = self.transport.delete_message(&handle).await {
            warn!(chat_id, message_id = handle.message_id, error = %e, "failed to delete notice");
        }
    }

    /// Tell the source chat that `subject` could not be delivered
    pub(super) async fn report_failure(&self, chat_id: i64, subject: &str, error: &Error) {
        let text = failure_text(subject, error);
        if let Err(e) = self.send_text_with_retry(chat_id, &text).await {
            warn!(chat_id, subject, error = %e, "failed to report failure");
        }
    }
}
