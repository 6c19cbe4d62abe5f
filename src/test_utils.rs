//! Shared test utilities for the s3fetch library crate.

use std::path::PathBuf;

use crate::config::{Config, ProgressMode, TransportConfig};
use crate::types::StoragePath;

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// Create a default [`Config`] suitable for most unit tests.
///
/// `download_dir` is canonicalized, matching the invariant the validated
/// production configuration upholds. Key defaults: `worker_size=2`, empty
/// prefix, bucket `"test-bucket"`, no client config (no SDK client is
/// built).
pub(crate) fn make_test_config(download_dir: PathBuf) -> Config {
    Config {
        target: StoragePath::S3 {
            bucket: "test-bucket".to_string(),
            prefix: String::new(),
        },
        download_dir: download_dir.canonicalize().unwrap(),
        delimiter: '/',
        filter_regex: None,
        worker_size: 2,
        dry_run: false,
        show_no_progress: true,
        progress_mode: ProgressMode::Simple,
        object_listing_queue_size: 1024,
        max_keys: 1000,
        transport: TransportConfig::default(),
        target_client_config: None,
        tracing_config: None,
        auto_complete_shell: None,
    }
}
