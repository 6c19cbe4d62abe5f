use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, trace};

use s3fetch_rs::config::Config;
use s3fetch_rs::{
    CLIArgs, DownloadPipeline, DownloadSummary, create_pipeline_cancellation_token,
    exit_code_from_error, is_cancelled_error,
};

mod ctrl_c_handler;
pub mod indicator;
mod tracing_init;
pub mod ui_config;

const EXIT_CODE_FAILURE: i32 = 1;
const EXIT_CODE_ABNORMAL_TERMINATION: i32 = 101;

/// s3fetch - Concurrent S3 object downloader.
///
/// This binary is a thin wrapper over the s3fetch-rs library.
/// All core functionality is implemented in the library crate.
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "s3fetch",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    run(config).await
}

fn load_config_exit_if_err() -> Config {
    let config = Config::try_from(CLIArgs::parse());
    if let Err(error_message) = config {
        clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit();
    }
    config.unwrap()
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    if config.tracing_config.is_none() {
        return false;
    }

    tracing_init::init_tracing(config.tracing_config.as_ref().unwrap());
    true
}

async fn run(config: Config) -> Result<()> {
    let cancellation_token = create_pipeline_cancellation_token();

    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let start_time = tokio::time::Instant::now();
    debug!("download pipeline start.");

    let mut pipeline = DownloadPipeline::new(config.clone(), cancellation_token.clone()).await;

    let indicator_join_handle = indicator::show_indicator(
        pipeline.get_stats_receiver(),
        ui_config::progress_options(&config),
    );

    pipeline.run().await;

    if let Err(e) = indicator_join_handle.await {
        error!("indicator task panicked: {}", e);
        std::process::exit(EXIT_CODE_ABNORMAL_TERMINATION);
    }

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());
    let summary = pipeline.take_summary().unwrap_or_default();

    report_failures(&summary, &config);

    if pipeline.has_error() {
        let errors = pipeline.get_errors_and_consume().unwrap();
        let mut code = EXIT_CODE_FAILURE;
        for err in &errors {
            if is_cancelled_error(err) {
                debug!("download cancelled by user.");
                continue;
            }
            code = code.max(exit_code_from_error(err));
            error!("{}", err);
        }
        error!(duration_sec = duration_sec, "s3fetch failed.");
        std::process::exit(code);
    }

    if cancellation_token.is_cancelled() {
        // Always shown, even with --quiet.
        println!("\nOperation cancelled by user.");
        debug!(duration_sec = duration_sec, "s3fetch cancelled.");
        std::process::exit(EXIT_CODE_FAILURE);
    }

    debug!(duration_sec = duration_sec, "s3fetch has been completed.");

    if !summary.failures.is_empty() {
        std::process::exit(EXIT_CODE_FAILURE);
    }

    Ok(())
}

/// Enumerate per-object failures after the aggregate summary.
///
/// Matching the original behavior, the per-object detail is shown with
/// `--debug`; the default output is the count and a pointer to the flag.
fn report_failures(summary: &DownloadSummary, config: &Config) {
    if summary.failures.is_empty() || config.show_no_progress {
        return;
    }

    println!();
    println!("{} objects failed to download.", summary.failures.len());

    let debug_enabled = config
        .tracing_config
        .map(|t| t.tracing_level >= log::Level::Debug)
        .unwrap_or(false);

    if debug_enabled {
        for failed in &summary.failures {
            println!("{failed} ({})", failed.kind.advice());
        }
    } else {
        println!("Use --debug to see per object failure information.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_fork::rusty_fork_test;
    use s3fetch_rs::config::args::parse_from_args;

    fn make_config(extra: &[&str]) -> Config {
        let dir = std::env::temp_dir();
        let dir = dir.to_str().unwrap();
        let mut args = vec!["s3fetch", "--download-dir", dir];
        args.extend_from_slice(extra);
        args.push("s3://test-bucket/prefix/");
        Config::try_from(parse_from_args(args).unwrap()).unwrap()
    }

    rusty_fork_test! {
        #[test]
        fn with_tracing() {
            let config = make_config(&["-d"]);
            assert!(start_tracing_if_necessary(&config));
        }

        #[test]
        fn without_tracing() {
            let config = make_config(&["-q"]);
            assert!(!start_tracing_if_necessary(&config));
        }
    }

    #[test]
    fn report_failures_is_silent_when_quiet() {
        let config = make_config(&["-q"]);
        let summary = DownloadSummary {
            success_count: 1,
            failures: vec![s3fetch_rs::FailedDownload {
                key: "a.txt".to_string(),
                kind: s3fetch_rs::ErrorKind::Network,
                message: "reset".to_string(),
            }],
        };
        // Nothing to assert beyond not panicking; quiet mode short-circuits.
        report_failures(&summary, &config);
    }
}
