//! Download pipeline orchestrator.
//!
//! The core coordinator that creates and connects all pipeline stages:
//!
//! ```text
//! ObjectLister → WorkQueue → ObjectDownloader × N (MPMC) → CompletionCollector
//! ```
//!
//! The pipeline streams: transfers begin as soon as the first keys are
//! listed, long before enumeration of a large bucket completes. Bounded
//! async channels between stages apply backpressure on the lister so memory
//! usage does not scale with bucket size.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_channel::Receiver;
use tracing::{debug, error, warn};

use crate::config::{
    Config, DEFAULT_MAX_KEYS, DEFAULT_QUEUE_SIZE, TransportConfig, WORKER_SIZE_WARN_THRESHOLD,
};
use crate::fetcher::ObjectDownloader;
use crate::lister::ObjectLister;
use crate::progress::ProgressSink;
use crate::stage::Stage;
use crate::storage::{self, Storage};
use crate::terminator::{CompletionCallback, CompletionCollector};
use crate::types::token::PipelineCancellationToken;
use crate::types::{
    DownloadStatistics, DownloadStats, DownloadStatsReport, DownloadSummary, S3Target, StoragePath,
};

/// The core download pipeline orchestrator.
///
/// ## Usage
///
/// ```no_run
/// # async fn example() {
/// # use s3fetch_rs::{Config, DownloadPipeline, create_pipeline_cancellation_token};
/// # let config: Config = todo!();
/// let cancellation_token = create_pipeline_cancellation_token();
/// let mut pipeline = DownloadPipeline::new(config, cancellation_token).await;
///
/// // Close the stats sender if you don't need real-time progress reporting.
/// pipeline.close_stats_sender();
///
/// // Run the pipeline (completes when listing and all transfers finish).
/// pipeline.run().await;
///
/// if pipeline.has_error() {
///     eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
/// }
///
/// let summary = pipeline.take_summary().unwrap();
/// println!(
///     "downloaded {} objects, {} failed",
///     summary.success_count,
///     summary.failures.len(),
/// );
/// # }
/// ```
pub struct DownloadPipeline {
    config: Config,
    target: Storage,
    cancellation_token: PipelineCancellationToken,
    stats_receiver: Receiver<DownloadStatistics>,
    has_error: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<anyhow::Error>>>,
    ready: bool,
    stats_report: Arc<DownloadStatsReport>,
    progress: Option<Arc<dyn ProgressSink>>,
    on_complete: Option<CompletionCallback>,
    summary: Option<DownloadSummary>,
}

impl DownloadPipeline {
    /// Create a pipeline with an S3 storage built from the configuration.
    pub async fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Self {
        let (stats_sender, stats_receiver) = async_channel::unbounded();
        let target =
            storage::create_storage(config.clone(), cancellation_token.clone(), stats_sender).await;
        Self::from_parts(config, target, cancellation_token, stats_receiver)
    }

    /// Create a pipeline around a pre-built storage (custom fetcher).
    ///
    /// The storage reports progress through its own stats channel; the
    /// pipeline's [`get_stats_receiver`](Self::get_stats_receiver) returns a
    /// closed channel in this mode.
    pub fn new_with_storage(
        config: Config,
        target: Storage,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        let stats_receiver = async_channel::unbounded().1;
        Self::from_parts(config, target, cancellation_token, stats_receiver)
    }

    fn from_parts(
        config: Config,
        target: Storage,
        cancellation_token: PipelineCancellationToken,
        stats_receiver: Receiver<DownloadStatistics>,
    ) -> Self {
        Self {
            config,
            target,
            cancellation_token,
            stats_receiver,
            has_error: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::new())),
            ready: true,
            stats_report: Arc::new(DownloadStatsReport::new()),
            progress: None,
            on_complete: None,
            summary: None,
        }
    }

    /// Register a per-key callback invoked for each successful download.
    pub fn set_on_complete(&mut self, on_complete: CompletionCallback) {
        self.on_complete = Some(on_complete);
    }

    /// Register an additional progress sink alongside the internal counters.
    pub fn set_progress_sink(&mut self, progress: Arc<dyn ProgressSink>) {
        self.progress = Some(progress);
    }

    /// Run the download pipeline to completion.
    pub async fn run(&mut self) {
        assert!(self.ready, "DownloadPipeline::run() called more than once");
        self.ready = false;

        if self.config.worker_size > WORKER_SIZE_WARN_THRESHOLD {
            warn!(
                worker_size = self.config.worker_size,
                "unusually large worker count; transfers may overwhelm the system or hit rate limits."
            );
        }

        let summary = self.execute_pipeline().await;
        self.summary = Some(summary);

        self.shutdown();
    }

    /// Check if any terminal error occurred during the pipeline execution.
    ///
    /// Per-object faults are reported in the summary's failures list and do
    /// not set this flag; only listing faults and protocol violations do.
    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    /// Consume and return all accumulated terminal errors.
    ///
    /// Returns `None` if no errors occurred.
    pub fn get_errors_and_consume(&self) -> Option<Vec<anyhow::Error>> {
        if !self.has_error() {
            return None;
        }
        let mut error_list = self.errors.lock().unwrap();
        let mut errors = Vec::with_capacity(error_list.len());
        while let Some(e) = error_list.pop_front() {
            errors.push(e);
        }
        Some(errors)
    }

    /// Get the stats receiver for progress reporting.
    pub fn get_stats_receiver(&self) -> Receiver<DownloadStatistics> {
        self.stats_receiver.clone()
    }

    /// Get a snapshot of the current download statistics.
    pub fn get_download_stats(&self) -> DownloadStats {
        self.stats_report.snapshot()
    }

    /// Take the aggregate result after [`run`](Self::run) completes.
    pub fn take_summary(&mut self) -> Option<DownloadSummary> {
        self.summary.take()
    }

    /// Close the stats sender to signal the progress reporter to finish.
    ///
    /// Call this before `run()` if you don't need progress reporting.
    pub fn close_stats_sender(&self) {
        self.target.get_stats_sender().close();
    }

    // -----------------------------------------------------------------------
    // Internal methods
    // -----------------------------------------------------------------------

    fn record_error(&self, error: anyhow::Error) {
        self.has_error.store(true, Ordering::SeqCst);
        self.errors.lock().unwrap().push_back(error);
    }

    fn shutdown(&self) {
        self.close_stats_sender();
    }

    /// Wire and run the stages: list → download × N → collect.
    async fn execute_pipeline(&self) -> DownloadSummary {
        let queue_size = self.config.object_listing_queue_size as usize;
        let (work_sender, work_receiver) = async_channel::bounded(queue_size);
        let (result_sender, result_receiver) = async_channel::bounded(queue_size);

        // Stage 1: the lister owns the work queue's only sender; every exit
        // path drops it, closing the queue exactly once.
        let lister_handle = {
            let stage = Stage::new(
                self.config.clone(),
                dyn_clone::clone_box(&*self.target),
                self.cancellation_token.clone(),
            );
            let lister = ObjectLister::new(
                stage,
                work_sender,
                self.stats_report.clone(),
                self.progress.clone(),
            );

            let max_keys = self.config.max_keys;
            let has_error = self.has_error.clone();
            let error_list = self.errors.clone();

            tokio::spawn(async move {
                let join_result =
                    tokio::spawn(async move { lister.list_target(max_keys).await }).await;

                match join_result {
                    Ok(Ok(())) => {
                        debug!("object lister completed successfully.");
                    }
                    Ok(Err(e)) => {
                        // Terminal for the run, but already-enqueued keys
                        // still drain through the workers.
                        has_error.store(true, Ordering::SeqCst);
                        error!("object lister failed: {}", e);
                        error_list.lock().unwrap().push_back(e);
                    }
                    Err(e) => {
                        has_error.store(true, Ordering::SeqCst);
                        error!("object lister task panicked: {}", e);
                        error_list
                            .lock()
                            .unwrap()
                            .push_back(anyhow::anyhow!("object lister task panicked: {}", e));
                    }
                }
            })
        };

        // Stage 2: N download workers sharing the work queue (MPMC).
        let mut worker_handles = Vec::with_capacity(self.config.worker_size as usize);
        for worker_index in 0..self.config.worker_size {
            let stage = Stage::new(
                self.config.clone(),
                dyn_clone::clone_box(&*self.target),
                self.cancellation_token.clone(),
            );
            let mut downloader = ObjectDownloader::new(
                stage,
                worker_index,
                work_receiver.clone(),
                result_sender.clone(),
                self.stats_report.clone(),
                self.progress.clone(),
            );

            let has_error = self.has_error.clone();
            let error_list = self.errors.clone();
            let cancellation_token = self.cancellation_token.clone();

            worker_handles.push(tokio::spawn(async move {
                let join_result =
                    tokio::spawn(async move { downloader.download().await }).await;

                match join_result {
                    Ok(Ok(())) => {
                        debug!(worker_index, "download worker completed successfully.");
                    }
                    Ok(Err(e)) => {
                        cancellation_token.cancel();
                        has_error.store(true, Ordering::SeqCst);
                        error!(worker_index, "download worker failed: {}", e);
                        error_list.lock().unwrap().push_back(e);
                    }
                    Err(e) => {
                        cancellation_token.cancel();
                        has_error.store(true, Ordering::SeqCst);
                        error!(worker_index, "download worker task panicked: {}", e);
                        error_list
                            .lock()
                            .unwrap()
                            .push_back(anyhow::anyhow!("download worker panicked: {}", e));
                    }
                }
            }));
        }

        // Drop the pipeline's copies so the queues close when the lister and
        // the last worker finish.
        drop(work_receiver);
        drop(result_sender);

        // Stage 3: drain completions into the summary.
        let collector = CompletionCollector::new(result_receiver, self.on_complete.clone());
        let collector_handle = tokio::spawn(async move { collector.collect().await });

        if let Err(e) = lister_handle.await {
            self.record_error(anyhow::anyhow!("lister supervisor task panicked: {}", e));
        }
        for handle in worker_handles {
            if let Err(e) = handle.await {
                self.record_error(anyhow::anyhow!("worker supervisor task panicked: {}", e));
            }
        }

        match collector_handle.await {
            Ok(summary) => summary,
            Err(e) => {
                self.record_error(anyhow::anyhow!("completion collector panicked: {}", e));
                DownloadSummary::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// One-call library entry point
// ---------------------------------------------------------------------------

/// Options for [`download`]. All fields are optional; `Default` gives the
/// same behavior as the bare CLI.
#[derive(Default)]
pub struct DownloadOptions {
    /// Directory to download into. Defaults to the current directory.
    pub download_dir: Option<PathBuf>,
    /// Filter keys by this regular expression (unanchored search).
    pub regex: Option<String>,
    /// Number of download workers. Defaults to the available core count.
    pub threads: Option<u16>,
    /// Bucket region. Defaults to `us-east-1`.
    pub region: Option<String>,
    /// Object key "directory" delimiter. Defaults to `/`.
    pub delimiter: Option<char>,
    /// List and create directories without transferring object data.
    pub dry_run: bool,
    /// Pre-built storage to use instead of constructing an S3 client.
    pub storage: Option<Storage>,
    /// Invoked with each successfully downloaded key.
    pub on_complete: Option<CompletionCallback>,
    /// Additional progress observer.
    pub progress: Option<Arc<dyn ProgressSink>>,
}

/// Download the objects under `s3_uri` into the configured directory.
///
/// Validation faults and terminal listing faults return `Err`; per-object
/// faults are reported in the returned summary's failures list. Callers
/// needing partial results alongside a terminal fault should drive
/// [`DownloadPipeline`] directly.
///
/// ```no_run
/// # async fn example() -> anyhow::Result<()> {
/// use s3fetch_rs::{DownloadOptions, download};
///
/// let summary = download(
///     "s3://my-bucket/photos/",
///     DownloadOptions {
///         regex: Some(r"\.jpg$".to_string()),
///         ..Default::default()
///     },
/// )
/// .await?;
/// println!("downloaded {} objects", summary.success_count);
/// # Ok(())
/// # }
/// ```
pub async fn download(s3_uri: &str, options: DownloadOptions) -> Result<DownloadSummary> {
    let target = S3Target::parse(s3_uri)?;
    let download_dir = crate::config::validate_download_dir(options.download_dir)?;
    let filter_regex = crate::config::compile_filter_regex(options.regex.as_deref())?;
    let worker_size = options
        .threads
        .unwrap_or_else(crate::config::default_worker_size)
        .max(1);

    let config = Config {
        target: StoragePath::S3 {
            bucket: target.bucket,
            prefix: target.prefix.unwrap_or_default(),
        },
        download_dir,
        delimiter: options.delimiter.unwrap_or('/'),
        filter_regex,
        worker_size,
        dry_run: options.dry_run,
        show_no_progress: true,
        progress_mode: crate::config::ProgressMode::Simple,
        object_listing_queue_size: DEFAULT_QUEUE_SIZE,
        max_keys: DEFAULT_MAX_KEYS,
        transport: TransportConfig::default(),
        target_client_config: Some(crate::config::ClientConfig {
            region: options
                .region
                .or_else(|| Some(crate::config::DEFAULT_REGION.to_string())),
            ..Default::default()
        }),
        tracing_config: None,
        auto_complete_shell: None,
    };

    let cancellation_token = crate::types::token::create_pipeline_cancellation_token();
    let mut pipeline = match options.storage {
        Some(storage) => DownloadPipeline::new_with_storage(config, storage, cancellation_token),
        None => DownloadPipeline::new(config, cancellation_token).await,
    };

    if let Some(on_complete) = options.on_complete {
        pipeline.set_on_complete(on_complete);
    }
    if let Some(progress) = options.progress {
        pipeline.set_progress_sink(progress);
    }

    pipeline.close_stats_sender();
    pipeline.run().await;

    if pipeline.has_error() {
        return Err(pipeline
            .get_errors_and_consume()
            .unwrap()
            .into_iter()
            .next()
            .unwrap());
    }

    Ok(pipeline.take_summary().unwrap_or_default())
}
