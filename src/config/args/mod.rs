use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use clap::builder::NonEmptyStringValueParser;

use crate::config::{
    CLITimeoutConfig, ClientConfig, Config, ProgressMode, RetryConfig, TracingConfig,
    TransportConfig,
};
use crate::types::{S3Target, StoragePath};

mod value_parser;


// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_DELIMITER: &str = "/";
const DEFAULT_DRY_RUN: bool = false;
const DEFAULT_QUIET: bool = false;
const DEFAULT_DEBUG: bool = false;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_QUEUE_SIZE: u32 = 1024;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_INVALID_URI: &str =
    "S3_URI must be an S3 path (e.g. s3://bucket or s3://bucket/prefix)";
const ERROR_MESSAGE_INVALID_DELIMITER: &str = "delimiter must be a single character";

// ---------------------------------------------------------------------------
// Value parser helpers
// ---------------------------------------------------------------------------

fn check_s3_uri(s: &str) -> Result<String, String> {
    if s.starts_with("s3://") && s.len() > 5 {
        Ok(s.to_string())
    } else {
        Err(ERROR_MESSAGE_INVALID_URI.to_string())
    }
}

fn check_delimiter(s: &str) -> Result<String, String> {
    if s.chars().count() == 1 {
        Ok(s.to_string())
    } else {
        Err(ERROR_MESSAGE_INVALID_DELIMITER.to_string())
    }
}

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// s3fetch - Easily download objects from an S3 bucket.
///
/// Example: s3fetch s3://my-test-bucket/my/birthday-photos/2020-01-01
///
/// The above downloads all objects located under the
/// `my/birthday-photos/2020-01-01` prefix.
///
/// Download a whole bucket with `s3fetch s3://my-test-bucket/`.
#[derive(Parser, Clone, Debug)]
#[command(name = "s3fetch", version, about, long_about = None)]
pub struct CLIArgs {
    /// S3 URI: s3://<BUCKET_NAME>[/prefix]
    #[arg(
        env,
        help = "s3://<BUCKET_NAME>[/prefix]",
        value_parser = check_s3_uri,
        default_value_if("auto_complete_shell", clap::builder::ArgPredicate::IsPresent, "s3://ignored"),
        required = false,
    )]
    pub s3_uri: String,

    // -----------------------------------------------------------------------
    // General options
    // -----------------------------------------------------------------------
    /// Download directory. Defaults to the current directory.
    #[arg(long, env, help_heading = "General")]
    pub download_dir: Option<PathBuf>,

    /// Filter the list of available objects by regex
    #[arg(short = 'r', long, env, value_parser = value_parser::regex::parse_regex, help_heading = "General")]
    pub regex: Option<String>,

    /// Object key "directory" delimiter (single character)
    #[arg(long, env, default_value = DEFAULT_DELIMITER, value_parser = check_delimiter, help_heading = "General")]
    pub delimiter: String,

    /// List objects only, but still create local directories
    #[arg(long, visible_alias = "list-only", env, default_value_t = DEFAULT_DRY_RUN, help_heading = "General")]
    pub dry_run: bool,

    /// Don't print to stdout
    #[arg(short = 'q', long, env, default_value_t = DEFAULT_QUIET, help_heading = "General")]
    pub quiet: bool,

    /// Progress display style
    #[arg(long, env, value_enum, default_value = "simple", help_heading = "General")]
    pub progress: ProgressMode,

    // -----------------------------------------------------------------------
    // Performance options
    // -----------------------------------------------------------------------
    /// Number of download threads. Defaults to the available core count.
    #[arg(short = 't', long, env, value_parser = clap::value_parser!(u16).range(1..), help_heading = "Performance")]
    pub threads: Option<u16>,

    /// Internal queue capacity between listing and download workers
    #[arg(long, env, default_value_t = DEFAULT_QUEUE_SIZE, value_parser = clap::value_parser!(u32).range(1..), help_heading = "Performance")]
    pub queue_size: u32,

    /// Maximum objects returned per listing request
    #[arg(long, env, default_value_t = DEFAULT_MAX_KEYS, value_parser = clap::value_parser!(i32).range(1..=32767), help_heading = "Performance")]
    pub max_keys: i32,

    // -----------------------------------------------------------------------
    // Tracing/Logging options
    // -----------------------------------------------------------------------
    /// Enable debug output
    #[arg(short = 'd', long, env, default_value_t = DEFAULT_DEBUG, help_heading = "Tracing/Logging")]
    pub debug: bool,

    /// Output structured logs in JSON format
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Tracing/Logging")]
    pub json_tracing: bool,

    /// Include AWS SDK internal traces in log output
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Tracing/Logging")]
    pub aws_sdk_tracing: bool,

    /// Disable colored output in logs
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Tracing/Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // AWS configuration
    // -----------------------------------------------------------------------
    /// Bucket region
    #[arg(long, env, default_value = DEFAULT_REGION, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS Configuration")]
    pub region: String,

    /// AWS CLI profile to resolve credentials from
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS Configuration")]
    pub profile: Option<String>,

    /// Custom S3-compatible endpoint URL (e.g. MinIO, Wasabi)
    #[arg(long, env, value_parser = value_parser::url::check_scheme, help_heading = "AWS Configuration")]
    pub endpoint_url: Option<String>,

    /// Use path-style access (required by some S3-compatible services)
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "AWS Configuration")]
    pub force_path_style: bool,

    // -----------------------------------------------------------------------
    // Retry and timeout options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry Options")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for retries
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry Options")]
    pub initial_backoff_milliseconds: u64,

    /// Overall operation timeout in milliseconds
    #[arg(long, env, help_heading = "Timeout Options")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds
    #[arg(long, env, help_heading = "Timeout Options")]
    pub connect_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // Advanced options
    // -----------------------------------------------------------------------
    /// Generate shell completions for the given shell
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use s3fetch_rs::config::args::parse_from_args;
///
/// let args = vec!["s3fetch", "s3://my-bucket/prefix/", "--dry-run"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert!(cli_args.dry_run);
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
///
/// Convenience function that combines `parse_from_args` and `Config::try_from`.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Validation and Config conversion
// ---------------------------------------------------------------------------

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        let target = S3Target::parse(&args.s3_uri).map_err(|e| e.to_string())?;

        let download_dir =
            crate::config::validate_download_dir(args.download_dir).map_err(|e| e.to_string())?;

        let filter_regex =
            crate::config::compile_filter_regex(args.regex.as_deref()).map_err(|e| e.to_string())?;

        // check_delimiter validated the length at parse time
        let delimiter = args
            .delimiter
            .chars()
            .next()
            .ok_or_else(|| ERROR_MESSAGE_INVALID_DELIMITER.to_string())?;

        let worker_size = args
            .threads
            .unwrap_or_else(crate::config::default_worker_size)
            .max(1);

        let tracing_config = if args.quiet {
            None
        } else {
            Some(TracingConfig {
                tracing_level: if args.debug {
                    log::Level::Debug
                } else {
                    log::Level::Warn
                },
                json_tracing: args.json_tracing,
                aws_sdk_tracing: args.aws_sdk_tracing,
                disable_color_tracing: args.disable_color_tracing,
            })
        };

        Ok(Config {
            target: StoragePath::S3 {
                bucket: target.bucket,
                prefix: target.prefix.unwrap_or_default(),
            },
            download_dir,
            delimiter,
            filter_regex,
            worker_size,
            dry_run: args.dry_run,
            show_no_progress: args.quiet,
            progress_mode: args.progress,
            object_listing_queue_size: args.queue_size,
            max_keys: args.max_keys,
            transport: TransportConfig::default(),
            target_client_config: Some(ClientConfig {
                region: Some(args.region),
                endpoint_url: args.endpoint_url,
                force_path_style: args.force_path_style,
                profile: args.profile,
                retry_config: RetryConfig {
                    aws_max_attempts: args.aws_max_attempts,
                    initial_backoff_milliseconds: args.initial_backoff_milliseconds,
                },
                cli_timeout_config: CLITimeoutConfig {
                    operation_timeout_milliseconds: args.operation_timeout_milliseconds,
                    connect_timeout_milliseconds: args.connect_timeout_milliseconds,
                },
            }),
            tracing_config,
            auto_complete_shell: args.auto_complete_shell,
        })
    }
}
