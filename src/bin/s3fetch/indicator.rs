// Progress indicator for the download pipeline.
//
// Reads DownloadStatistics from the stats channel and renders progress in
// the style selected with --progress: per-key lines (simple/detailed) or a
// live-updating status line (live-update/fancy).

use std::io;
use std::io::Write;

use async_channel::Receiver;
use indicatif::{HumanBytes, HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use s3fetch_rs::types::DownloadStatistics;
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use crate::ui_config::ProgressOptions;
use s3fetch_rs::ProgressMode;

/// Summary returned by [`show_indicator`] after the stats channel closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorSummary {
    pub total_found_count: u64,
    pub total_download_count: u64,
    pub total_download_bytes: u64,
    pub total_error_count: u64,
}

/// Moving average window in seconds (samples).
const MOVING_AVERAGE_PERIOD_SECS: usize = 10;

/// How often (in seconds) to refresh the live progress display.
const REFRESH_INTERVAL: f32 = 1.0;

/// Spawn a background task that reads download statistics from the channel
/// and displays progress.
///
/// The task runs until the stats channel is closed (all senders dropped).
/// Returns a `JoinHandle` that should be awaited after the pipeline
/// finishes.
pub fn show_indicator(
    stats_receiver: Receiver<DownloadStatistics>,
    options: ProgressOptions,
) -> JoinHandle<IndicatorSummary> {
    let progress_text = match options.mode {
        ProgressMode::Fancy => {
            let bar = ProgressBar::new(0);
            bar.set_style(ProgressStyle::with_template("{spinner} {wide_msg}").unwrap());
            bar
        }
        _ => {
            let bar = ProgressBar::new(0);
            bar.set_style(ProgressStyle::with_template("{wide_msg}").unwrap());
            bar
        }
    };

    tokio::spawn(async move {
        let start_time = Instant::now();

        let mut ma_download_count = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();

        let mut total_found_count: u64 = 0;
        let mut total_download_count: u64 = 0;
        let mut total_download_bytes: u64 = 0;
        let mut total_error_count: u64 = 0;

        let per_key_lines = matches!(options.mode, ProgressMode::Simple | ProgressMode::Detailed);
        let live_line = matches!(options.mode, ProgressMode::LiveUpdate | ProgressMode::Fancy);

        loop {
            let mut period_count: u64 = 0;

            let period = Instant::now();
            loop {
                while let Ok(stats) = stats_receiver.try_recv() {
                    match stats {
                        DownloadStatistics::ObjectFound { key } => {
                            total_found_count += 1;
                            if options.show_progress
                                && options.mode == ProgressMode::Detailed
                            {
                                println!("{key}...found");
                            }
                        }
                        DownloadStatistics::DownloadComplete { key } => {
                            period_count += 1;
                            total_download_count += 1;
                            if options.show_progress && per_key_lines {
                                println!("{key}...done");
                            }
                        }
                        DownloadStatistics::DownloadBytes(size) => {
                            total_download_bytes += size;
                        }
                        DownloadStatistics::DownloadError { key } => {
                            total_error_count += 1;
                            if options.show_progress && per_key_lines {
                                println!("{key}...error");
                            }
                        }
                    }
                }

                if REFRESH_INTERVAL < period.elapsed().as_secs_f32() {
                    break;
                }

                if stats_receiver.is_closed() && stats_receiver.is_empty() {
                    // --- FINAL SUMMARY ---
                    let elapsed = start_time.elapsed();
                    let elapsed_secs_f64 = elapsed.as_secs_f64();

                    let mut objects_per_sec =
                        (total_download_count as f64 / elapsed_secs_f64) as u64;

                    if elapsed_secs_f64 < REFRESH_INTERVAL as f64 {
                        objects_per_sec = total_download_count;
                    }
                    if options.dry_run {
                        objects_per_sec = 0;
                    }

                    info!(
                        message = "download summary",
                        found_objects = total_found_count,
                        downloaded_objects = total_download_count,
                        downloaded_bytes = total_download_bytes,
                        downloaded_objects_per_sec = objects_per_sec,
                        error = total_error_count,
                        duration_sec = elapsed_secs_f64,
                    );

                    if options.show_result {
                        progress_text.set_style(ProgressStyle::with_template("{msg}").unwrap());

                        progress_text.finish_with_message(format!(
                            "downloaded {:>3} of {} objects | {:>3} objects/sec,  error {} objects,  downloaded {:>3},  duration {}",
                            total_download_count,
                            total_found_count,
                            HumanCount(objects_per_sec),
                            total_error_count,
                            HumanBytes(total_download_bytes),
                            HumanDuration(elapsed),
                        ));

                        println!();
                        io::stdout().flush().unwrap()
                    }

                    return IndicatorSummary {
                        total_found_count,
                        total_download_count,
                        total_download_bytes,
                        total_error_count,
                    };
                }

                tokio::time::sleep(std::time::Duration::from_secs_f32(0.05)).await;
            }

            if !options.dry_run {
                ma_download_count.add_sample(period_count);
            }

            if options.show_progress && live_line {
                progress_text.set_message(format!(
                    "downloaded {:>3} of {} objects | {:>3} objects/sec,  error {} objects,  downloaded {:>3}",
                    total_download_count,
                    total_found_count,
                    HumanCount(ma_download_count.get_average()),
                    total_error_count,
                    HumanBytes(total_download_bytes),
                ));
            }
        }
    })
}
