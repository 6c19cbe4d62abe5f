/*!
# s3fetch-rs

s3fetch-rs concurrently downloads a selected subset of objects from an
S3-compatible bucket to a local directory tree. It is optimized for the case
where the selection is a small fraction of a very large bucket: object
enumeration and object transfer run as an overlapped pipeline, so the first
bytes land on disk before the listing completes.

## Features

- **Streaming start**: transfers begin while the listing is still paginating.
- **Concurrent transfers**: a bounded pool of download workers, with the
  transport's connection pool sized so workers never serialize on pool
  exhaustion.
- **Crash-safe writes**: each object streams into a temp file and is
  atomically renamed into place, so destinations are never observed
  half-written.
- **Path-escape protection**: crafted keys like `../../etc/passwd` cannot
  write outside the download directory.
- **Regex selection**: filter keys with an unanchored regular-expression
  search.
- **Library-first**: all CLI features are available programmatically; the
  `s3fetch` binary is a thin wrapper.

## Architecture

```text
ObjectLister → WorkQueue → ObjectDownloader × N (MPMC) → CompletionCollector
```

The lister paginates the bucket, skips directory markers, applies the
optional regex, and feeds a bounded work queue. N workers pull keys, derive
destinations, and stream objects to disk. A completion collector folds
per-object results into the final summary. A shared cancellation token stops
all stages cooperatively.

## Quick Start (Library Usage)

```toml
[dependencies]
s3fetch-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use s3fetch_rs::{DownloadOptions, download};

# async fn example() -> anyhow::Result<()> {
let summary = download(
    "s3://my-bucket/photos/2020/",
    DownloadOptions {
        regex: Some(r"\.jpg$".to_string()),
        threads: Some(8),
        ..Default::default()
    },
)
.await?;

println!(
    "downloaded {} objects, {} failed",
    summary.success_count,
    summary.failures.len(),
);
# Ok(())
# }
```

For partial results alongside terminal errors, progress channels, or custom
storage backends, drive [`DownloadPipeline`] directly.
*/

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

pub mod config;
pub mod fetcher;
pub mod lister;
pub mod path;
pub mod pipeline;
pub mod progress;
pub mod stage;
pub mod storage;
pub mod terminator;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

// ---------------------------------------------------------------------------
// Root-level re-exports for convenient access
// ---------------------------------------------------------------------------

// Core pipeline
pub use pipeline::{DownloadOptions, DownloadPipeline, download};

// Configuration
pub use config::{Config, ProgressMode, TransportConfig};
pub use config::args::{CLIArgs, build_config_from_args, parse_from_args};

// Statistics and progress
pub use progress::{NoopProgressSink, ProgressSink};
pub use types::{DownloadStatistics, DownloadStats, DownloadStatsReport};

// Object and result types
pub use types::{
    DownloadResult, DownloadSummary, FailedDownload, ObjectPage, RemoteObject, S3Target,
};

// Error types
pub use types::error::{ErrorKind, S3FetchError, exit_code_from_error, is_cancelled_error};

// Cancellation token
pub use types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};

// Completion callback
pub use terminator::CompletionCallback;
