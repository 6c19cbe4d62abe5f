//! AWS S3 client construction.
//!
//! Builds the SDK client from [`ClientConfig`]: region, optional custom
//! endpoint and path-style addressing for S3-compatible services, the retry
//! policy, and request timeouts. Credential resolution is delegated to the
//! SDK default chain (environment, shared config, IMDS); `profile` selects a
//! named profile.

use std::time::Duration;

use aws_config::retry::RetryConfig as SdkRetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;

use crate::config::ClientConfig;

impl ClientConfig {
    /// Build an S3 client from this configuration.
    pub async fn create_client(&self) -> Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(profile) = &self.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }

        loader = loader.retry_config(
            SdkRetryConfig::standard()
                .with_max_attempts(self.retry_config.aws_max_attempts)
                .with_initial_backoff(Duration::from_millis(
                    self.retry_config.initial_backoff_milliseconds,
                )),
        );

        let mut timeout_builder = TimeoutConfig::builder();
        if let Some(ms) = self.cli_timeout_config.operation_timeout_milliseconds {
            timeout_builder = timeout_builder.operation_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.cli_timeout_config.connect_timeout_milliseconds {
            timeout_builder = timeout_builder.connect_timeout(Duration::from_millis(ms));
        }
        loader = loader.timeout_config(timeout_builder.build());

        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint_url) = &self.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }
        if self.force_path_style {
            builder = builder.force_path_style(true);
        }

        Client::from_conf(builder.build())
    }
}
