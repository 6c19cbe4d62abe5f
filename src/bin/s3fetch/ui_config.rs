// UI configuration helpers.
//
// Determines how progress is rendered based on the Config (quiet mode,
// verbosity, JSON logging, selected progress style).

use s3fetch_rs::ProgressMode;
use s3fetch_rs::config::Config;

/// Rendering options handed to the indicator task.
#[derive(Debug, Clone, Copy)]
pub struct ProgressOptions {
    pub mode: ProgressMode,
    pub show_progress: bool,
    pub show_result: bool,
    pub dry_run: bool,
}

/// Derive the indicator options from the configuration.
pub fn progress_options(config: &Config) -> ProgressOptions {
    ProgressOptions {
        mode: config.progress_mode,
        show_progress: is_progress_needed(config),
        show_result: is_show_result_needed(config),
        dry_run: config.dry_run,
    }
}

/// Whether to show per-key or live-updating progress output.
///
/// Returns `false` when:
/// - quiet mode is set
/// - verbosity is above Warn (tracing takes over the terminal)
/// - JSON logging is enabled (progress text would corrupt JSON output)
fn is_progress_needed(config: &Config) -> bool {
    if config.show_no_progress {
        return false;
    }

    let Some(tracing_config) = &config.tracing_config else {
        return true;
    };

    if log::Level::Warn < tracing_config.tracing_level {
        return false;
    }

    !tracing_config.json_tracing
}

/// Whether to show the final result summary line.
///
/// Unlike the progress output, the summary is still shown at high
/// verbosity.
fn is_show_result_needed(config: &Config) -> bool {
    if config.show_no_progress {
        return false;
    }

    let Some(tracing_config) = &config.tracing_config else {
        return true;
    };

    !tracing_config.json_tracing
}
