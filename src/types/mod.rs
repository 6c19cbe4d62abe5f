use std::fmt;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::types::error::ErrorKind;

pub mod error;
pub mod token;

// ---------------------------------------------------------------------------
// Listed object types
// ---------------------------------------------------------------------------

/// One object returned by the bucket listing.
///
/// The size is carried from the listing into the download workers so that
/// multi-part transfer planning and the size invariant check need no extra
/// HeadObject round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub size: i64,
}

impl RemoteObject {
    pub fn new(key: impl Into<String>, size: i64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// One page of the paginated bucket listing, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub objects: Vec<RemoteObject>,
    /// Continuation token for the next page; `None` on the last page.
    pub next_continuation_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Per-object outcome types
// ---------------------------------------------------------------------------

/// Classified fault attached to a failed [`DownloadResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultInfo {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a single dequeued key; emitted exactly once per key.
///
/// Dry-run downloads report success with `bytes = 0`. `destination` is absent
/// only for faults raised before a safe destination path exists (path
/// escapes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub key: String,
    pub destination: Option<PathBuf>,
    pub bytes: u64,
    pub error: Option<FaultInfo>,
}

impl DownloadResult {
    pub fn success(key: impl Into<String>, destination: PathBuf, bytes: u64) -> Self {
        Self {
            key: key.into(),
            destination: Some(destination),
            bytes,
            error: None,
        }
    }

    pub fn failure(
        key: impl Into<String>,
        destination: Option<PathBuf>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            destination,
            bytes: 0,
            error: Some(FaultInfo {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-object failure record accumulated by the completion collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDownload {
    pub key: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl Display for FailedDownload {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.key, self.kind, self.message)
    }
}

/// Aggregate result of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub success_count: u64,
    pub failures: Vec<FailedDownload>,
}

// ---------------------------------------------------------------------------
// Statistics types
// ---------------------------------------------------------------------------

/// Statistics sent through the stats channel during pipeline execution.
///
/// Each variant is a single event sent from the lister or a download worker
/// to the progress reporter via an async channel.
#[derive(Debug, PartialEq, Eq)]
pub enum DownloadStatistics {
    ObjectFound { key: String },
    DownloadComplete { key: String },
    DownloadBytes(u64),
    DownloadError { key: String },
}

/// Aggregate download statistics with atomic counters.
///
/// `found` has a single writer (the lister); `downloaded`, `bytes` and
/// `failed` are incremented concurrently by the download workers.
#[derive(Debug, Default)]
pub struct DownloadStatsReport {
    pub stats_found_objects: AtomicU64,
    pub stats_downloaded_objects: AtomicU64,
    pub stats_downloaded_bytes: AtomicU64,
    pub stats_failed_objects: AtomicU64,
}

impl DownloadStatsReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one listed object. Single writer; only visibility is required.
    pub fn increment_found(&self) {
        self.stats_found_objects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed download with the given byte size.
    pub fn increment_downloaded(&self, bytes: u64) {
        self.stats_downloaded_objects.fetch_add(1, Ordering::Relaxed);
        self.stats_downloaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a failed download attempt.
    pub fn increment_failed(&self) {
        self.stats_failed_objects.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of the current statistics.
    ///
    /// `downloaded` and `bytes` are loaded before `found`, and `found` is
    /// always incremented before the enqueue, so a snapshot can never show
    /// `downloaded > found`.
    ///
    /// The `duration` field in the returned [`DownloadStats`] is
    /// `Duration::default()`; callers measuring wall time override it.
    pub fn snapshot(&self) -> DownloadStats {
        let downloaded_objects = self.stats_downloaded_objects.load(Ordering::Relaxed);
        let downloaded_bytes = self.stats_downloaded_bytes.load(Ordering::Relaxed);
        let failed_objects = self.stats_failed_objects.load(Ordering::Relaxed);
        let found_objects = self.stats_found_objects.load(Ordering::Acquire);
        DownloadStats {
            found_objects,
            downloaded_objects,
            downloaded_bytes,
            failed_objects,
            duration: Duration::default(),
        }
    }
}

/// Public API download statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadStats {
    pub found_objects: u64,
    pub downloaded_objects: u64,
    pub downloaded_bytes: u64,
    pub failed_objects: u64,
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// S3 target types
// ---------------------------------------------------------------------------

/// S3 target specification parsed from an s3:// URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Target {
    pub bucket: String,
    pub prefix: Option<String>,
}

impl S3Target {
    /// Parse an S3 URI in the format `s3://bucket[/prefix]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use s3fetch_rs::types::S3Target;
    ///
    /// let target = S3Target::parse("s3://my-bucket/photos/2020/").unwrap();
    /// assert_eq!(target.bucket, "my-bucket");
    /// assert_eq!(target.prefix.as_deref(), Some("photos/2020/"));
    ///
    /// let target = S3Target::parse("s3://my-bucket").unwrap();
    /// assert_eq!(target.bucket, "my-bucket");
    /// assert!(target.prefix.is_none());
    /// ```
    pub fn parse(s3_uri: &str) -> anyhow::Result<Self> {
        if !s3_uri.starts_with("s3://") {
            return Err(anyhow::anyhow!(error::S3FetchError::InvalidUri(format!(
                "URI must start with 's3://': {s3_uri}"
            ))));
        }

        let without_scheme = &s3_uri[5..];

        if without_scheme.is_empty() {
            return Err(anyhow::anyhow!(error::S3FetchError::InvalidUri(format!(
                "Bucket name cannot be empty: {s3_uri}"
            ))));
        }

        let (bucket, prefix) = match without_scheme.find('/') {
            Some(idx) => {
                let bucket = &without_scheme[..idx];
                let prefix = &without_scheme[idx + 1..];
                (
                    bucket.to_string(),
                    if prefix.is_empty() {
                        None
                    } else {
                        Some(prefix.to_string())
                    },
                )
            }
            None => (without_scheme.to_string(), None),
        };

        if bucket.is_empty() {
            return Err(anyhow::anyhow!(error::S3FetchError::InvalidUri(format!(
                "Bucket name cannot be empty: {s3_uri}"
            ))));
        }

        Ok(S3Target { bucket, prefix })
    }
}

impl Display for S3Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "s3://{}/{}", self.bucket, prefix),
            None => write!(f, "s3://{}", self.bucket),
        }
    }
}

/// Storage path specification for the pipeline target.
#[derive(Debug, Clone)]
pub enum StoragePath {
    S3 { bucket: String, prefix: String },
}

impl StoragePath {
    pub fn prefix(&self) -> &str {
        match self {
            StoragePath::S3 { prefix, .. } => prefix,
        }
    }

    pub fn bucket(&self) -> &str {
        match self {
            StoragePath::S3 { bucket, .. } => bucket,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
