//! Progress observation capability.
//!
//! The pipeline reports listing and transfer progress through the
//! [`ProgressSink`] trait. Any implementation of the two operations is
//! acceptable; no inheritance relationship is required. The pipeline always
//! maintains its own [`DownloadStatsReport`] and additionally forwards to a
//! caller-supplied sink when one is configured.

use crate::types::DownloadStatsReport;

/// Observer for pipeline progress.
///
/// `increment_found` is invoked from the single lister task and needs only
/// visibility; `increment_downloaded` is invoked concurrently from every
/// download worker and implementations must be safe against concurrent calls.
pub trait ProgressSink: Send + Sync {
    /// One matching object was discovered by the listing.
    fn increment_found(&self);

    /// One object finished downloading with the given byte count.
    fn increment_downloaded(&self, bytes: u64);
}

/// A sink that ignores all progress events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn increment_found(&self) {}

    fn increment_downloaded(&self, _bytes: u64) {}
}

impl ProgressSink for DownloadStatsReport {
    fn increment_found(&self) {
        DownloadStatsReport::increment_found(self);
    }

    fn increment_downloaded(&self, bytes: u64) {
        DownloadStatsReport::increment_downloaded(self, bytes);
    }
}
