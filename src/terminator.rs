//! Completion-drain stage for the download pipeline.
//!
//! The collector consumes every `DownloadResult` from the completion queue
//! until the last worker drops its sender, invoking the optional per-key
//! callback for successes and folding failures into the final summary.
//! Draining continuously also keeps workers from blocking on a full
//! completion queue.

use std::sync::Arc;

use async_channel::Receiver;
use tracing::debug;

use crate::types::{DownloadResult, DownloadSummary, FailedDownload};

/// Per-key observer invoked for each successfully downloaded object.
pub type CompletionCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Terminal stage that folds the completion queue into a [`DownloadSummary`].
pub struct CompletionCollector {
    receiver: Receiver<DownloadResult>,
    on_complete: Option<CompletionCallback>,
}

impl CompletionCollector {
    pub fn new(receiver: Receiver<DownloadResult>, on_complete: Option<CompletionCallback>) -> Self {
        Self {
            receiver,
            on_complete,
        }
    }

    /// Consume results until the channel closes.
    pub async fn collect(&self) -> DownloadSummary {
        debug!("completion collector has started.");

        let mut success_count: u64 = 0;
        let mut failures: Vec<FailedDownload> = Vec::new();

        while let Ok(result) = self.receiver.recv().await {
            match result.error {
                None => {
                    success_count += 1;
                    if let Some(on_complete) = &self.on_complete {
                        on_complete(&result.key);
                    }
                }
                Some(fault) => failures.push(FailedDownload {
                    key: result.key,
                    kind: fault.kind,
                    message: fault.message,
                }),
            }
        }

        debug!(
            success_count,
            failure_count = failures.len(),
            "completion collector has been completed."
        );

        DownloadSummary {
            success_count,
            failures,
        }
    }
}
