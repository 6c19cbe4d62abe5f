//! Shared integration-test infrastructure.
//!
//! Provides an in-memory [`StorageTrait`] implementation with paging,
//! injectable per-key faults and latency, plus helpers to build a pipeline
//! configuration over a temp directory. The capabilities the pipeline
//! consumes are injectable, so the whole suite runs hermetically.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use s3fetch_rs::config::{Config, ProgressMode, TransportConfig};
use s3fetch_rs::storage::StorageTrait;
use s3fetch_rs::types::error::{ErrorKind, S3FetchError};
use s3fetch_rs::types::{DownloadStatistics, ObjectPage, RemoteObject, StoragePath};
use s3fetch_rs::{DownloadPipeline, DownloadSummary, create_pipeline_cancellation_token};

/// In-memory bucket serving a fixed key set through the storage capability.
#[derive(Clone)]
pub struct MemoryStorage {
    objects: Arc<Vec<(String, Vec<u8>)>>,
    prefix: String,
    page_size: usize,
    fail_keys: Arc<Vec<String>>,
    transfer_delay: Option<Duration>,
    pages_served: Arc<AtomicU32>,
    stats_sender: Sender<DownloadStatistics>,
}

impl MemoryStorage {
    pub fn builder() -> MemoryStorageBuilder {
        MemoryStorageBuilder::default()
    }

    pub fn pages_served(&self) -> u32 {
        self.pages_served.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MemoryStorageBuilder {
    objects: Vec<(String, Vec<u8>)>,
    prefix: String,
    page_size: Option<usize>,
    fail_keys: Vec<String>,
    transfer_delay: Option<Duration>,
}

impl MemoryStorageBuilder {
    pub fn object(mut self, key: &str, body: &[u8]) -> Self {
        self.objects.push((key.to_string(), body.to_vec()));
        self
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn fail_key(mut self, key: &str) -> Self {
        self.fail_keys.push(key.to_string());
        self
    }

    pub fn transfer_delay(mut self, delay: Duration) -> Self {
        self.transfer_delay = Some(delay);
        self
    }

    pub fn build(self) -> (MemoryStorage, async_channel::Receiver<DownloadStatistics>) {
        let (stats_sender, stats_receiver) = async_channel::unbounded();
        (
            MemoryStorage {
                objects: Arc::new(self.objects),
                prefix: self.prefix,
                page_size: self.page_size.unwrap_or(1000),
                fail_keys: Arc::new(self.fail_keys),
                transfer_delay: self.transfer_delay,
                pages_served: Arc::new(AtomicU32::new(0)),
                stats_sender,
            },
            stats_receiver,
        )
    }
}

#[async_trait]
impl StorageTrait for MemoryStorage {
    async fn list_object_page(
        &self,
        continuation_token: Option<String>,
        _max_keys: i32,
    ) -> Result<ObjectPage> {
        self.pages_served.fetch_add(1, Ordering::SeqCst);

        let matching: Vec<&(String, Vec<u8>)> = self
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(&self.prefix))
            .collect();

        let start: usize = continuation_token
            .map(|token| token.parse().unwrap())
            .unwrap_or(0);
        let end = (start + self.page_size).min(matching.len());

        let objects = matching[start..end]
            .iter()
            .map(|(key, body)| RemoteObject::new(key.clone(), body.len() as i64))
            .collect();

        let next_continuation_token = if end < matching.len() {
            Some(end.to_string())
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            next_continuation_token,
        })
    }

    async fn get_object_to_file(&self, key: &str, path: &Path, _size_hint: i64) -> Result<u64> {
        if let Some(delay) = self.transfer_delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_keys.iter().any(|k| k == key) {
            return Err(anyhow!(S3FetchError::Fault {
                kind: ErrorKind::Network,
                message: "injected transfer fault".to_string(),
            }));
        }

        let body = self
            .objects
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, body)| body)
            .ok_or_else(|| {
                anyhow!(S3FetchError::Fault {
                    kind: ErrorKind::NotFound,
                    message: format!("NoSuchKey: {key}"),
                })
            })?;

        tokio::fs::write(path, body).await?;
        Ok(body.len() as u64)
    }

    fn get_stats_sender(&self) -> Sender<DownloadStatistics> {
        self.stats_sender.clone()
    }

    async fn send_stats(&self, stats: DownloadStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }
}

/// Build a pipeline configuration over `root`.
pub fn make_config(root: &Path, prefix: &str) -> Config {
    Config {
        target: StoragePath::S3 {
            bucket: "test-bucket".to_string(),
            prefix: prefix.to_string(),
        },
        download_dir: root.canonicalize().unwrap(),
        delimiter: '/',
        filter_regex: None,
        worker_size: 4,
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

/// Result of a pipeline run with its error state.
pub struct PipelineResult {
    pub summary: DownloadSummary,
    pub has_error: bool,
    pub errors: Vec<String>,
}

/// Run a pipeline over the given storage and configuration to completion.
pub async fn run_pipeline(storage: MemoryStorage, config: Config) -> PipelineResult {
    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline =
        DownloadPipeline::new_with_storage(config, Box::new(storage), cancellation_token);
    pipeline.run().await;

    let has_error = pipeline.has_error();
    let errors = pipeline
        .get_errors_and_consume()
        .unwrap_or_default()
        .iter()
        .map(|e| e.to_string())
        .collect();

    PipelineResult {
        summary: pipeline.take_summary().unwrap_or_default(),
        has_error,
        errors,
    }
}

/// Collect every file (not directory) under `root`, relative to it.
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }
    files.sort();
    files
}
