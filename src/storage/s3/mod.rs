pub mod client_builder;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::storage::{Storage, StorageTrait};
use crate::types::error::{ErrorKind, S3FetchError, classify_sdk_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{DownloadStatistics, ObjectPage, RemoteObject, StoragePath};

/// Objects at or above this size are fetched with concurrent range requests.
const MULTIPART_THRESHOLD_BYTES: i64 = 8 * 1024 * 1024;

/// Size of each range request in a multi-part fetch.
const PART_SIZE_BYTES: i64 = 8 * 1024 * 1024;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// S3 storage implementation for the download pipeline.
///
/// One instance (and its clones) shares a single SDK client and a transfer
/// permit pool sized by [`TransportConfig`](crate::config::TransportConfig),
/// so aggregate in-flight GET concurrency is bounded regardless of how many
/// workers hold a copy.
#[derive(Clone)]
pub struct S3Storage {
    bucket: String,
    prefix: String,
    cancellation_token: PipelineCancellationToken,
    client: Option<Arc<Client>>,
    stats_sender: Sender<DownloadStatistics>,
    transfer_semaphore: Arc<Semaphore>,
}

impl S3Storage {
    /// Create the storage for the given configuration.
    ///
    /// The SDK client is only constructed when a client configuration is
    /// present; unit tests inject storage without one.
    pub async fn create(
        config: Config,
        cancellation_token: PipelineCancellationToken,
        stats_sender: Sender<DownloadStatistics>,
    ) -> Storage {
        let client = match &config.target_client_config {
            Some(client_config) => Some(Arc::new(client_config.create_client().await)),
            None => None,
        };

        let pool_size = config.transport.pool_size(config.worker_size);
        tracing::debug!(pool_size, worker_size = config.worker_size, "transfer permit pool sized.");

        let StoragePath::S3 { bucket, prefix } = config.target.clone();

        Box::new(Self {
            bucket,
            prefix,
            cancellation_token,
            client,
            stats_sender,
            transfer_semaphore: Arc::new(Semaphore::new(pool_size)),
        })
    }

    fn client(&self) -> &Arc<Client> {
        self.client.as_ref().unwrap()
    }

    /// Stream a response body into `file`, classifying read faults as
    /// network errors and write faults as filesystem errors.
    async fn copy_body_to_file(
        &self,
        body: aws_smithy_types::byte_stream::ByteStream,
        file: &mut tokio::fs::File,
        key: &str,
    ) -> Result<u64> {
        let mut reader = body.into_async_read();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut written: u64 = 0;

        loop {
            if self.cancellation_token.is_cancelled() {
                return Err(anyhow!(S3FetchError::Cancelled));
            }

            let n = reader.read(&mut buffer).await.map_err(|e| {
                anyhow!(S3FetchError::Fault {
                    kind: ErrorKind::Network,
                    message: format!("reading object stream for {key} failed: {e}"),
                })
            })?;
            if n == 0 {
                break;
            }

            file.write_all(&buffer[..n]).await.map_err(|e| {
                anyhow!(S3FetchError::Fault {
                    kind: ErrorKind::Filesystem,
                    message: format!("writing object data for {key} failed: {e}"),
                })
            })?;
            written += n as u64;
        }

        file.flush().await.map_err(|e| {
            anyhow!(S3FetchError::Fault {
                kind: ErrorKind::Filesystem,
                message: format!("flushing object data for {key} failed: {e}"),
            })
        })?;

        Ok(written)
    }

    async fn get_object_single(&self, key: &str, path: &Path) -> Result<u64> {
        let _permit = self.transfer_semaphore.clone().acquire_owned().await.unwrap();

        if self.cancellation_token.is_cancelled() {
            return Err(anyhow!(S3FetchError::Cancelled));
        }

        let output = self
            .client()
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| get_object_fault(&self.bucket, key, &e))?;

        let content_length = output.content_length();

        let mut file = tokio::fs::File::create(path).await.map_err(|e| {
            anyhow!(S3FetchError::Fault {
                kind: ErrorKind::Filesystem,
                message: format!("creating {} failed: {e}", path.display()),
            })
        })?;

        let written = self.copy_body_to_file(output.body, &mut file, key).await?;

        if let Some(expected) = content_length {
            if expected >= 0 && written != expected as u64 {
                return Err(anyhow!(S3FetchError::Fault {
                    kind: ErrorKind::Network,
                    message: format!(
                        "object {key} truncated: expected {expected} bytes, wrote {written}"
                    ),
                }));
            }
        }

        Ok(written)
    }

    async fn get_object_ranged(&self, key: &str, path: &Path, size: i64) -> Result<u64> {
        let file = tokio::fs::File::create(path).await.map_err(|e| {
            anyhow!(S3FetchError::Fault {
                kind: ErrorKind::Filesystem,
                message: format!("creating {} failed: {e}", path.display()),
            })
        })?;
        file.set_len(size as u64).await.map_err(|e| {
            anyhow!(S3FetchError::Fault {
                kind: ErrorKind::Filesystem,
                message: format!("sizing {} failed: {e}", path.display()),
            })
        })?;
        drop(file);

        let mut parts: JoinSet<Result<u64>> = JoinSet::new();

        for (start, end) in part_ranges(size, PART_SIZE_BYTES) {
            // Acquiring here (not inside the task) bounds the spawn rate to
            // the pool capacity.
            let permit = self.transfer_semaphore.clone().acquire_owned().await.unwrap();

            if self.cancellation_token.is_cancelled() {
                parts.abort_all();
                return Err(anyhow!(S3FetchError::Cancelled));
            }

            let storage = self.clone();
            let key = key.to_string();
            let path: PathBuf = path.to_path_buf();
            parts.spawn(async move {
                let _permit = permit;
                storage.fetch_range(&key, &path, start, end).await
            });
        }

        let mut total: u64 = 0;
        while let Some(joined) = parts.join_next().await {
            match joined {
                Ok(Ok(written)) => total += written,
                Ok(Err(e)) => {
                    parts.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    parts.abort_all();
                    return Err(anyhow!(S3FetchError::Pipeline(format!(
                        "range download task panicked: {e}"
                    ))));
                }
            }
        }

        if total != size as u64 {
            return Err(anyhow!(S3FetchError::Fault {
                kind: ErrorKind::Network,
                message: format!("object {key} truncated: expected {size} bytes, wrote {total}"),
            }));
        }

        Ok(total)
    }

    async fn fetch_range(&self, key: &str, path: &Path, start: u64, end: u64) -> Result<u64> {
        let output = self
            .client()
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes={start}-{end}"))
            .send()
            .await
            .map_err(|e| get_object_fault(&self.bucket, key, &e))?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .await
            .map_err(|e| {
                anyhow!(S3FetchError::Fault {
                    kind: ErrorKind::Filesystem,
                    message: format!("opening {} failed: {e}", path.display()),
                })
            })?;
        file.seek(SeekFrom::Start(start)).await.map_err(|e| {
            anyhow!(S3FetchError::Fault {
                kind: ErrorKind::Filesystem,
                message: format!("seeking in {} failed: {e}", path.display()),
            })
        })?;

        self.copy_body_to_file(output.body, &mut file, key).await
    }
}

#[async_trait]
impl StorageTrait for S3Storage {
    async fn list_object_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage> {
        let output = self
            .client()
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&self.prefix)
            .set_continuation_token(continuation_token)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| {
                let (kind, detail) = classify_sdk_error(&e);
                tracing::error!(
                    bucket = self.bucket,
                    prefix = self.prefix,
                    kind = %kind,
                    detail = detail,
                    "S3 ListObjectsV2 API call failed for s3://{}/{}.",
                    self.bucket,
                    self.prefix,
                );
                anyhow!(S3FetchError::Fault {
                    kind,
                    message: format!(
                        "listing s3://{}/{} failed: {detail}",
                        self.bucket, self.prefix
                    ),
                })
            })?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                object.key().map(|key| RemoteObject {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0),
                })
            })
            .collect();

        let next_continuation_token = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(String::from)
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            next_continuation_token,
        })
    }

    async fn get_object_to_file(&self, key: &str, path: &Path, size_hint: i64) -> Result<u64> {
        if size_hint >= MULTIPART_THRESHOLD_BYTES {
            self.get_object_ranged(key, path, size_hint).await
        } else {
            self.get_object_single(key, path).await
        }
    }

    fn get_stats_sender(&self) -> Sender<DownloadStatistics> {
        self.stats_sender.clone()
    }

    async fn send_stats(&self, stats: DownloadStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }
}

fn get_object_fault(
    bucket: &str,
    key: &str,
    e: &aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>,
) -> anyhow::Error {
    let (kind, detail) = classify_sdk_error(e);
    tracing::error!(
        bucket = bucket,
        key = key,
        kind = %kind,
        detail = detail,
        "S3 GetObject API call failed for s3://{bucket}/{key}.",
    );
    anyhow!(S3FetchError::Fault {
        kind,
        message: format!("fetching s3://{bucket}/{key} failed: {detail}"),
    })
}

/// Inclusive byte ranges covering `size` bytes in `part_size` chunks.
fn part_ranges(size: i64, part_size: i64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut start: i64 = 0;
    while start < size {
        let end = (start + part_size).min(size) - 1;
        ranges.push((start as u64, end as u64));
        start += part_size;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_dummy_tracing_subscriber, make_test_config};
    use crate::types::token::create_pipeline_cancellation_token;

    #[test]
    fn part_ranges_single_part() {
        assert_eq!(part_ranges(100, 1000), vec![(0, 99)]);
    }

    #[test]
    fn part_ranges_exact_multiple() {
        assert_eq!(part_ranges(2000, 1000), vec![(0, 999), (1000, 1999)]);
    }

    #[test]
    fn part_ranges_with_remainder() {
        assert_eq!(
            part_ranges(2500, 1000),
            vec![(0, 999), (1000, 1999), (2000, 2499)]
        );
    }

    #[test]
    fn part_ranges_zero_size() {
        assert!(part_ranges(0, 1000).is_empty());
    }

    #[test]
    fn part_ranges_cover_every_byte_exactly_once() {
        for size in [1i64, 7, 999, 1000, 1001, 12345] {
            let ranges = part_ranges(size, 1000);
            let mut expected_start: u64 = 0;
            for (start, end) in &ranges {
                assert_eq!(*start, expected_start);
                assert!(end >= start);
                expected_start = end + 1;
            }
            assert_eq!(expected_start, size as u64);
        }
    }

    #[tokio::test]
    async fn create_without_client_config_has_no_client() {
        init_dummy_tracing_subscriber();

        let config = make_test_config(std::env::temp_dir());
        assert!(config.target_client_config.is_none());

        let cancellation_token = create_pipeline_cancellation_token();
        let (stats_sender, _stats_receiver) = async_channel::unbounded();
        let storage = S3Storage::create(config, cancellation_token, stats_sender).await;

        // The stats channel is usable without a client.
        storage
            .send_stats(DownloadStatistics::DownloadBytes(1))
            .await;
    }
}
