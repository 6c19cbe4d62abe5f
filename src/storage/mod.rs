use std::path::Path;

use anyhow::Result;
use async_channel::Sender;
use async_trait::async_trait;
use dyn_clone::DynClone;

use crate::config::Config;
use crate::types::token::PipelineCancellationToken;
use crate::types::{DownloadStatistics, ObjectPage};

pub mod s3;

/// Type alias for a boxed Storage trait object.
///
/// Worker copies obtained via `dyn_clone::clone_box` share the underlying
/// client and transfer permit pool, so a single connection pool serves the
/// whole worker fleet.
pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// Listing and object-fetch capabilities consumed by the download pipeline.
///
/// The pipeline specifies only this contract; `S3Storage` is the production
/// implementation and tests substitute in-memory fakes.
#[async_trait]
pub trait StorageTrait: DynClone {
    /// Fetch one page of the bucket listing, in server order.
    ///
    /// `continuation_token` is `None` for the first page; the returned page
    /// carries the token for the next one. Listing failures are treated as
    /// unrecoverable errors for the run.
    async fn list_object_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage>;

    /// Download one object into `path`, returning the bytes written.
    ///
    /// `size_hint` is the size reported by the listing; implementations may
    /// use it to parallelize range requests internally. Faults are raised as
    /// classified [`S3FetchError::Fault`](crate::types::error::S3FetchError)
    /// values.
    async fn get_object_to_file(&self, key: &str, path: &Path, size_hint: i64) -> Result<u64>;

    /// Get the statistics sender channel.
    fn get_stats_sender(&self) -> Sender<DownloadStatistics>;

    /// Send a statistics event through the channel.
    async fn send_stats(&self, stats: DownloadStatistics);
}

dyn_clone::clone_trait_object!(StorageTrait);

/// Create the S3 storage instance for the download pipeline.
///
/// The transfer permit pool is sized from the transport configuration and
/// the worker count before any work is dispatched, so workers never
/// serialize on pool exhaustion.
pub async fn create_storage(
    config: Config,
    cancellation_token: PipelineCancellationToken,
    stats_sender: Sender<DownloadStatistics>,
) -> Storage {
    s3::S3Storage::create(config, cancellation_token, stats_sender).await
}
