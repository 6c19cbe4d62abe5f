// Initializes the tracing subscriber for the CLI binary. The library itself
// never installs a subscriber.

use std::env;
use std::io::IsTerminal;

use s3fetch_rs::config::TracingConfig;

const EVENT_FILTER_ENV_VAR: &str = "RUST_LOG";

pub fn init_tracing(config: &TracingConfig) {
    let subscriber_builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .compact()
        .with_target(false)
        .with_ansi(!config.disable_color_tracing && std::io::stderr().is_terminal());

    let mut show_target = true;
    let tracing_level = config.tracing_level;
    let event_filter = if config.aws_sdk_tracing {
        format!(
            "s3fetch_rs={tracing_level},s3fetch={tracing_level},aws_smithy_runtime={tracing_level},aws_config={tracing_level},aws_sigv4={tracing_level}"
        )
    } else if env::var(EVENT_FILTER_ENV_VAR).is_ok() {
        env::var(EVENT_FILTER_ENV_VAR).unwrap()
    } else {
        show_target = false;
        format!("s3fetch_rs={tracing_level},s3fetch={tracing_level}")
    };

    let subscriber_builder = subscriber_builder
        .with_env_filter(event_filter)
        .with_target(show_target);
    if config.json_tracing {
        subscriber_builder.json().init();
    } else {
        subscriber_builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_fork::rusty_fork_test;

    fn make_tracing_config(json_tracing: bool, aws_sdk_tracing: bool) -> TracingConfig {
        TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing,
            aws_sdk_tracing,
            disable_color_tracing: false,
        }
    }

    rusty_fork_test! {
        #[test]
        fn init_json_tracing() {
            init_tracing(&make_tracing_config(true, false));
        }

        #[test]
        fn init_aws_sdk_tracing() {
            init_tracing(&make_tracing_config(false, true));
        }

        #[test]
        fn init_normal_tracing() {
            // Runs in a separate process, so mutating the env is safe.
            unsafe { env::remove_var(EVENT_FILTER_ENV_VAR) };

            init_tracing(&make_tracing_config(false, false));
        }

        #[test]
        fn init_with_env() {
            // Runs in a separate process, so mutating the env is safe.
            unsafe { env::set_var(EVENT_FILTER_ENV_VAR, "trace") };

            init_tracing(&make_tracing_config(false, false));
        }
    }
}
