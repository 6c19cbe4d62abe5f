//! Example: Using s3fetch-rs as a library.
//!
//! This example demonstrates how to:
//! 1. Build a [`Config`] from CLI-style arguments
//! 2. Run the [`DownloadPipeline`] with a per-key completion callback
//! 3. Inspect the summary and statistics
//!
//! Run with:
//! ```sh
//! cargo run --example library_usage -- s3://my-bucket/prefix/ --dry-run
//! ```

use std::sync::Arc;

use anyhow::Result;
use s3fetch_rs::{
    Config, DownloadPipeline, build_config_from_args, create_pipeline_cancellation_token,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Build Config from real CLI arguments (same parser as the s3fetch
    //    binary). You could also construct Config manually if you prefer.
    let config: Config =
        build_config_from_args(std::env::args_os()).map_err(|e| anyhow::anyhow!(e))?;

    // 2. Create a cancellation token (wire to Ctrl+C if desired).
    let token = create_pipeline_cancellation_token();

    // 3. Build the pipeline and register a per-key callback.
    let mut pipeline = DownloadPipeline::new(config, token).await;
    pipeline.set_on_complete(Arc::new(|key: &str| {
        println!("  done: {key}");
    }));

    // Close the stats sender if you don't need the stats receiver channel.
    pipeline.close_stats_sender();

    pipeline.run().await;

    // 4. Check for terminal errors (listing faults, protocol violations).
    if pipeline.has_error() {
        let errors = pipeline.get_errors_and_consume().unwrap();
        for err in &errors {
            eprintln!("Pipeline error: {err:?}");
        }
    }

    // 5. Print the summary.
    let stats = pipeline.get_download_stats();
    let summary = pipeline.take_summary().unwrap_or_default();
    println!(
        "Summary: {} downloaded ({} bytes), {} failed",
        summary.success_count,
        stats.downloaded_bytes,
        summary.failures.len(),
    );
    for failed in &summary.failures {
        eprintln!("  FAILED: {failed}");
    }

    Ok(())
}
