use std::sync::Arc;

use anyhow::{Context, Result};
use async_channel::Sender;
use fancy_regex::Regex;
use tracing::{debug, info};

use crate::progress::ProgressSink;
use crate::stage::Stage;
use crate::types::{DownloadStatistics, DownloadStatsReport, RemoteObject};

/// Lists objects and feeds the download work queue.
///
/// The ObjectLister is the producer end of the pipeline: it drives the
/// paginated listing through the storage capability, filters each returned
/// key, and enqueues matches for the download workers.
///
/// ```text
/// ObjectLister → WorkQueue → ObjectDownloader × N → CompletionCollector
/// ```
///
/// Pagination is sequential, so enqueue order equals the server's listing
/// order. The lister owns the work queue's only sender; dropping it on any
/// exit path (completion, cancellation, listing fault) closes the queue
/// exactly once, which is the termination signal for the worker pool.
pub struct ObjectLister {
    stage: Stage,
    sender: Sender<RemoteObject>,
    stats_report: Arc<DownloadStatsReport>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl ObjectLister {
    pub fn new(
        stage: Stage,
        sender: Sender<RemoteObject>,
        stats_report: Arc<DownloadStatsReport>,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Self {
        Self {
            stage,
            sender,
            stats_report,
            progress,
        }
    }

    /// Paginate the target bucket and enqueue matching objects.
    ///
    /// Per key: directory markers (keys ending with the delimiter) are
    /// skipped, then the optional regex is applied as an unanchored search.
    /// The found counter is incremented before the enqueue so `downloaded`
    /// can never be observed above `found`.
    ///
    /// Cancellation stops pagination after the current page. A listing fault
    /// is terminal for the run and propagates to the pipeline; objects
    /// already enqueued still drain through the workers.
    pub async fn list_target(&self, max_keys: i32) -> Result<()> {
        debug!("object listing has started.");

        let delimiter = self.stage.config.delimiter;
        let filter_regex = self.stage.config.filter_regex.clone();
        let mut continuation_token: Option<String> = None;

        loop {
            if self.stage.cancellation_token.is_cancelled() {
                info!("object listing cancelled.");
                return Ok(());
            }

            let page = self
                .stage
                .target
                .list_object_page(continuation_token.clone(), max_keys)
                .await?;

            for object in page.objects {
                if self.stage.cancellation_token.is_cancelled() {
                    info!("object listing cancelled.");
                    return Ok(());
                }

                if is_directory_marker(&object.key, delimiter) {
                    debug!(key = object.key, "skipped directory marker.");
                    continue;
                }

                if let Some(regex) = &filter_regex {
                    if !matches_filter(regex, &object.key)? {
                        debug!(key = object.key, "object filtered.");
                        continue;
                    }
                }

                self.stats_report.increment_found();
                if let Some(progress) = &self.progress {
                    progress.increment_found();
                }
                self.stage
                    .target
                    .send_stats(DownloadStatistics::ObjectFound {
                        key: object.key.clone(),
                    })
                    .await;

                if let Err(e) = self
                    .sender
                    .send(object)
                    .await
                    .context("async_channel::Sender::send() failed.")
                {
                    // A closed queue here means the worker pool is gone
                    // (shutdown already under way), not a listing fault.
                    return if !self.sender.is_closed() { Err(e) } else { Ok(()) };
                }
            }

            match page.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        debug!("object listing has been completed.");
        Ok(())
    }
}

/// A key whose final character is the delimiter names a virtual directory
/// and never enters the work queue.
pub(crate) fn is_directory_marker(key: &str, delimiter: char) -> bool {
    key.ends_with(delimiter)
}

/// Unanchored regex search over the full key.
fn matches_filter(regex: &Regex, key: &str) -> Result<bool> {
    regex
        .is_match(key)
        .with_context(|| format!("regex evaluation failed for key {key}"))
}
