use std::path::PathBuf;

use fancy_regex::Regex;

use crate::types::StoragePath;
use crate::types::error::S3FetchError;

pub mod args;

/// Default number of keys per listing request.
pub const DEFAULT_MAX_KEYS: i32 = 1000;

/// Default bounded capacity of the work queue. Backpressure on the lister
/// keeps memory usage independent of bucket size.
pub const DEFAULT_QUEUE_SIZE: u32 = 1024;

/// Default AWS region when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Worker counts above this threshold draw a warning (but are not rejected).
pub const WORKER_SIZE_WARN_THRESHOLD: u16 = 1000;

/// Main configuration for the s3fetch-rs download pipeline.
///
/// Holds all settings needed to configure and run a
/// [`DownloadPipeline`](crate::DownloadPipeline): target bucket/prefix,
/// download directory, key filter, worker pool size, transport sizing, and
/// the optional AWS client configuration.
///
/// Build a `Config` from CLI arguments via
/// [`Config::try_from`](crate::config::args::CLIArgs) or construct it
/// directly for programmatic use; [`crate::download`] assembles one from
/// [`DownloadOptions`](crate::DownloadOptions).
#[derive(Debug, Clone)]
pub struct Config {
    pub target: StoragePath,
    /// Absolute, existing, canonicalized download root.
    pub download_dir: PathBuf,
    /// Object key "directory" delimiter (single character).
    pub delimiter: char,
    /// Optional key filter; applied as an unanchored search.
    pub filter_regex: Option<Regex>,
    pub worker_size: u16,
    pub dry_run: bool,
    /// Suppress all progress/summary output (CLI quiet mode).
    pub show_no_progress: bool,
    pub progress_mode: ProgressMode,
    /// Bounded capacity of the work and completion queues.
    pub object_listing_queue_size: u32,
    /// Keys per listing request (pagination page size).
    pub max_keys: i32,
    pub transport: TransportConfig,
    pub target_client_config: Option<ClientConfig>,
    pub tracing_config: Option<TracingConfig>,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

/// Progress rendering style for the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ProgressMode {
    /// One `<key>...done` line per completed object.
    #[default]
    Simple,
    /// Per-object lines including objects as they are found.
    Detailed,
    /// A single live-updating status line.
    LiveUpdate,
    /// A live-updating status line with a spinner.
    Fancy,
}

/// AWS S3 client configuration.
///
/// Credential resolution itself is delegated to the SDK default chain;
/// `profile` selects a named profile when set.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub profile: Option<String>,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            region: Some(DEFAULT_REGION.to_string()),
            endpoint_url: None,
            force_path_style: false,
            profile: None,
            retry_config: RetryConfig::default(),
            cli_timeout_config: CLITimeoutConfig::default(),
        }
    }
}

/// Retry configuration for AWS SDK operations.
///
/// Throttled and transient network faults are retried by the SDK with
/// exponential backoff; the pipeline adds no retry layer of its own.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            aws_max_attempts: 10,
            initial_backoff_milliseconds: 100,
        }
    }
}

/// Timeout configuration for AWS SDK operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub disable_color_tracing: bool,
}

/// Connection-pool sizing for the shared transport.
///
/// The transfer permit pool bounds aggregate in-flight GET requests across
/// all workers. If the pool were smaller than the aggregate concurrency,
/// workers would serialize on pool acquisition and effective concurrency
/// would collapse silently, so the pool is sized to the worst case.
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    /// Concurrent range requests a single worker can issue (multi-part GET).
    pub per_worker_connections: usize,
    /// The transport's own default pool size; the floor of the computation.
    pub baseline_pool_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            per_worker_connections: 10,
            baseline_pool_size: 10,
        }
    }
}

impl TransportConfig {
    /// Pool capacity for `worker_size` concurrent workers:
    /// `max(baseline, workers × per-worker connections)`.
    pub fn pool_size(&self, worker_size: u16) -> usize {
        self.baseline_pool_size
            .max(worker_size as usize * self.per_worker_connections)
    }
}

/// Resolve and validate the download directory.
///
/// `None` selects the current directory. The directory must already exist;
/// the returned path is canonicalized so descendant checks against it are
/// symlink-safe.
pub fn validate_download_dir(download_dir: Option<PathBuf>) -> Result<PathBuf, S3FetchError> {
    let dir = match download_dir {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(|e| {
            S3FetchError::InvalidConfig(format!("cannot determine current directory: {e}"))
        })?,
    };

    if !dir.is_dir() {
        return Err(S3FetchError::InvalidConfig(format!(
            "download directory does not exist or is not a directory: {}",
            dir.display()
        )));
    }

    dir.canonicalize().map_err(|e| {
        S3FetchError::InvalidConfig(format!(
            "cannot access download directory {}: {e}",
            dir.display()
        ))
    })
}

/// Compile the optional key filter pattern.
pub fn compile_filter_regex(pattern: Option<&str>) -> Result<Option<Regex>, S3FetchError> {
    match pattern {
        None => Ok(None),
        Some(pattern) => Regex::new(pattern)
            .map(Some)
            .map_err(|e| S3FetchError::InvalidRegex(format!("{pattern}: {e}"))),
    }
}

/// Default worker count: the affinity-aware available parallelism, falling
/// back to 1 when detection fails.
pub fn default_worker_size() -> u16 {
    std::thread::available_parallelism()
        .map(|n| u16::try_from(n.get()).unwrap_or(u16::MAX))
        .unwrap_or(1)
}
