//! Download workers for the pipeline.
//!
//! N `ObjectDownloader` workers share the work queue (MPMC) and emit exactly
//! one `DownloadResult` per dequeued key onto the completion queue, whether
//! the transfer succeeded, failed, or was cancelled. Per-object faults are
//! captured as failure results and never abort the pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::path::{DeriveError, derive_destination};
use crate::progress::ProgressSink;
use crate::stage::Stage;
use crate::types::error::{ErrorKind, S3FetchError, fault_from_error};
use crate::types::{DownloadResult, DownloadStatistics, DownloadStatsReport, RemoteObject};

pub mod write_guard;

pub use write_guard::{DestinationWriteGuard, TMP_SUFFIX};

/// Pipeline worker that downloads objects from the work queue.
///
/// Per key the worker derives the destination, creates parent directories,
/// streams the object into a temp file through the storage capability, and
/// atomically renames it into place. The destination is therefore never
/// observable in a partial state.
pub struct ObjectDownloader {
    worker_index: u16,
    stage: Stage,
    receiver: Receiver<RemoteObject>,
    result_sender: Sender<DownloadResult>,
    stats_report: Arc<DownloadStatsReport>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl ObjectDownloader {
    pub fn new(
        stage: Stage,
        worker_index: u16,
        receiver: Receiver<RemoteObject>,
        result_sender: Sender<DownloadResult>,
        stats_report: Arc<DownloadStatsReport>,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Self {
        Self {
            worker_index,
            stage,
            receiver,
            result_sender,
            stats_report,
            progress,
        }
    }

    /// Main worker loop: receive keys until the queue closes or cancellation
    /// fires.
    ///
    /// A key dequeued after cancellation produces a `Cancelled` result, so
    /// completed destinations plus cancelled results always account for
    /// every dequeued key.
    pub async fn download(&mut self) -> Result<()> {
        debug!(worker_index = self.worker_index, "download worker started.");

        loop {
            tokio::select! {
                // Biased: a key already dequeued when cancellation fires is
                // answered with a Cancelled result rather than dropped.
                biased;
                recv_result = self.receiver.recv() => {
                    match recv_result {
                        Ok(object) => {
                            if self.stage.cancellation_token.is_cancelled() {
                                self.emit_result(DownloadResult::failure(
                                    object.key,
                                    None,
                                    ErrorKind::Cancelled,
                                    "cancelled before transfer started",
                                ))
                                .await?;
                                info!(worker_index = self.worker_index, "download worker has been cancelled.");
                                return Ok(());
                            }
                            self.process_object(object).await?;
                        }
                        Err(_) => {
                            debug!(worker_index = self.worker_index, "download worker has been completed.");
                            break;
                        }
                    }
                }
                _ = self.stage.cancellation_token.cancelled() => {
                    info!(worker_index = self.worker_index, "download worker has been cancelled.");
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn process_object(&self, object: RemoteObject) -> Result<()> {
        let result = self.download_object(&object).await;

        match &result.error {
            None => {
                self.stats_report.increment_downloaded(result.bytes);
                if let Some(progress) = &self.progress {
                    progress.increment_downloaded(result.bytes);
                }
                self.stage
                    .target
                    .send_stats(DownloadStatistics::DownloadComplete {
                        key: result.key.clone(),
                    })
                    .await;
                self.stage
                    .target
                    .send_stats(DownloadStatistics::DownloadBytes(result.bytes))
                    .await;
            }
            Some(fault) => {
                self.stats_report.increment_failed();
                warn!(
                    worker_index = self.worker_index,
                    key = result.key,
                    kind = %fault.kind,
                    message = fault.message,
                    "object download failed."
                );
                self.stage
                    .target
                    .send_stats(DownloadStatistics::DownloadError {
                        key: result.key.clone(),
                    })
                    .await;
            }
        }

        self.emit_result(result).await
    }

    /// Emitting into a closed completion queue while workers are alive is a
    /// protocol violation and fatal.
    async fn emit_result(&self, result: DownloadResult) -> Result<()> {
        self.result_sender.send(result).await.map_err(|_| {
            anyhow!(S3FetchError::Pipeline(
                "completion queue closed while workers are running".to_string()
            ))
        })
    }

    async fn download_object(&self, object: &RemoteObject) -> DownloadResult {
        let config = &self.stage.config;
        let root = &config.download_dir;

        let destination = match derive_destination(
            root,
            &object.key,
            config.target.prefix(),
            config.delimiter,
        ) {
            Ok(destination) => destination,
            Err(DeriveError::PathEscape) => {
                return DownloadResult::failure(
                    object.key.clone(),
                    None,
                    ErrorKind::PathEscape,
                    format!("key {} escapes the download root", object.key),
                );
            }
            Err(DeriveError::EmptyRelativeKey) => {
                return DownloadResult::failure(
                    object.key.clone(),
                    None,
                    ErrorKind::PathEscape,
                    format!("key {} resolves to an empty relative path", object.key),
                );
            }
        };

        if let Err(e) = tokio::fs::create_dir_all(&destination.directory).await {
            return DownloadResult::failure(
                object.key.clone(),
                Some(destination.path),
                ErrorKind::Filesystem,
                format!(
                    "creating directory {} failed: {e}",
                    destination.directory.display()
                ),
            );
        }

        // The lexical check cannot see symlinks in pre-existing directory
        // components; canonicalize the created parent and re-verify descent.
        let final_path = match self.resolve_final_path(&destination.directory, &destination.path) {
            Ok(path) => path,
            Err(result_error) => {
                return DownloadResult::failure(
                    object.key.clone(),
                    Some(destination.path),
                    result_error.0,
                    result_error.1,
                );
            }
        };

        if config.dry_run {
            debug!(
                worker_index = self.worker_index,
                key = object.key,
                destination = %final_path.display(),
                "dry run, skipping transfer."
            );
            return DownloadResult::success(object.key.clone(), final_path, 0);
        }

        let guard = match DestinationWriteGuard::new(&final_path).await {
            Ok(guard) => guard,
            Err(e) => {
                return DownloadResult::failure(
                    object.key.clone(),
                    Some(final_path),
                    ErrorKind::Filesystem,
                    format!("preparing temp file failed: {e}"),
                );
            }
        };

        debug!(
            worker_index = self.worker_index,
            key = object.key,
            destination = %final_path.display(),
            "downloading object."
        );

        match self
            .stage
            .target
            .get_object_to_file(&object.key, guard.staging_path(), object.size)
            .await
        {
            Ok(bytes) => match guard.commit().await {
                Ok(()) => DownloadResult::success(object.key.clone(), final_path, bytes),
                Err(e) => DownloadResult::failure(
                    object.key.clone(),
                    Some(final_path),
                    ErrorKind::Filesystem,
                    format!("renaming temp file failed: {e}"),
                ),
            },
            Err(e) => {
                guard.discard().await;
                let (kind, message) = fault_from_error(&e);
                DownloadResult::failure(object.key.clone(), Some(final_path), kind, message)
            }
        }
    }

    fn resolve_final_path(
        &self,
        directory: &std::path::Path,
        derived_path: &std::path::Path,
    ) -> Result<PathBuf, (ErrorKind, String)> {
        let canonical_dir = std::fs::canonicalize(directory).map_err(|e| {
            (
                ErrorKind::Filesystem,
                format!("resolving directory {} failed: {e}", directory.display()),
            )
        })?;

        if !canonical_dir.starts_with(&self.stage.config.download_dir) {
            return Err((
                ErrorKind::PathEscape,
                format!(
                    "directory {} resolves outside the download root",
                    directory.display()
                ),
            ));
        }

        match derived_path.file_name() {
            Some(name) => Ok(canonical_dir.join(name)),
            None => Err((
                ErrorKind::PathEscape,
                format!("{} has no filename component", derived_path.display()),
            )),
        }
    }
}
