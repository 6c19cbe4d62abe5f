use std::fmt;
use std::fmt::{Display, Formatter};

use anyhow::Error;
use aws_sdk_s3::error::SdkError;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use thiserror::Error;

/// Stable user-facing classification of per-object and transport faults.
///
/// Every fault raised by the pipeline is mapped into one of these kinds.
/// Classification drives the user-visible messages and determines whether the
/// transport retried the request; the pipeline itself adds no retry layer on
/// top of the SDK's retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credentials are missing, invalid, or expired.
    Auth,
    /// The bucket, prefix, or object does not exist.
    NotFound,
    /// The credentials lack permission for the operation.
    AccessDenied,
    /// The request was throttled by the service after SDK retries.
    Throttled,
    /// A network-level fault (connect, timeout, DNS, truncated stream).
    Network,
    /// A local filesystem fault (create, write, rename).
    Filesystem,
    /// The derived destination would escape the download root.
    PathEscape,
    /// The operation was cancelled before the object completed.
    Cancelled,
    /// Anything the classifier could not attribute.
    Unknown,
}

impl ErrorKind {
    /// Actionable hint shown by the CLI next to a classified failure.
    pub fn advice(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "check your AWS credentials configuration",
            ErrorKind::NotFound => "bucket or prefix does not exist",
            ErrorKind::AccessDenied => "check bucket permissions",
            ErrorKind::Throttled => "reduce thread count or retry later",
            ErrorKind::Network => "check connectivity",
            ErrorKind::Filesystem => "check download directory permissions and free space",
            ErrorKind::PathEscape => "object key resolves outside the download directory",
            ErrorKind::Cancelled => "operation was cancelled",
            ErrorKind::Unknown => "see the error message for details",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Auth => "auth error",
            ErrorKind::NotFound => "not found",
            ErrorKind::AccessDenied => "access denied",
            ErrorKind::Throttled => "throttled",
            ErrorKind::Network => "network error",
            ErrorKind::Filesystem => "filesystem error",
            ErrorKind::PathEscape => "path escape",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown error",
        };
        write!(f, "{name}")
    }
}

/// Application-level error types for s3fetch-rs.
///
/// These represent errors that occur during pipeline operations,
/// configuration, and user interaction.
///
/// ## Exit Codes
///
/// Each variant maps to a process exit code (via `exit_code()`):
/// - 1: Runtime failure (faults, cancellation after partial work, pipeline)
/// - 2: Usage errors (invalid URI, bad regex, bad configuration)
///
/// A fully successful run exits 0; a run with per-object failures exits 1.
#[derive(Error, Debug, PartialEq)]
pub enum S3FetchError {
    /// Invalid S3 URI format.
    #[error("Invalid S3 URI: {0}")]
    InvalidUri(String),

    /// Invalid regex pattern.
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    /// Configuration error (missing download dir, bad delimiter, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A classified transport or filesystem fault.
    #[error("{kind}: {message}")]
    Fault { kind: ErrorKind, message: String },

    /// Operation cancelled by user.
    #[error("Operation cancelled by user")]
    Cancelled,

    /// Some objects downloaded, some failed.
    #[error("Partial failure: {downloaded} downloaded, {failed} failed")]
    PartialFailure { downloaded: u64, failed: u64 },

    /// General pipeline error (closed channels, panicked tasks).
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl S3FetchError {
    /// Get the appropriate process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            S3FetchError::InvalidUri(_)
            | S3FetchError::InvalidRegex(_)
            | S3FetchError::InvalidConfig(_) => 2,
            _ => 1,
        }
    }
}

/// Check if an anyhow::Error wraps a cancellation error.
pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3FetchError>() {
        return *err == S3FetchError::Cancelled;
    }
    false
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<S3FetchError>() {
        return err.exit_code();
    }
    1
}

/// Map an S3 service error code to its user-facing classification.
pub fn classify_s3_error_code(code: &str) -> ErrorKind {
    match code {
        "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken" | "InvalidToken"
        | "TokenRefreshRequired" => ErrorKind::Auth,
        "NoSuchBucket" | "NoSuchKey" | "NotFound" => ErrorKind::NotFound,
        "AccessDenied" => ErrorKind::AccessDenied,
        "SlowDown" | "TooManyRequests" | "Throttling" | "ThrottlingException"
        | "RequestLimitExceeded" => ErrorKind::Throttled,
        "RequestTimeout" => ErrorKind::Network,
        _ => ErrorKind::Unknown,
    }
}

/// Classify an AWS SDK error into a user-facing kind and detail message.
///
/// For service errors (S3 API responses), the S3 error code drives the
/// classification and the detail carries `code: message`. For other error
/// types (dispatch, timeout, malformed response) the fault is a network
/// fault and the detail is the SDK's own description.
pub fn classify_sdk_error<E>(e: &SdkError<E>) -> (ErrorKind, String)
where
    E: std::fmt::Display + ProvideErrorMetadata,
{
    if let Some(service_err) = e.as_service_error() {
        let code = service_err.code().unwrap_or("unknown");
        let message = service_err.message().unwrap_or("no message");
        (classify_s3_error_code(code), format!("{code}: {message}"))
    } else {
        let kind = match e {
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
                ErrorKind::Network
            }
            _ => ErrorKind::Unknown,
        };
        (kind, e.to_string())
    }
}

/// Derive the `(kind, message)` pair for a per-object failure result.
///
/// Storage implementations raise `S3FetchError::Fault` for classified
/// transport faults and `S3FetchError::Cancelled` for cooperative aborts;
/// bare I/O errors are local filesystem faults.
pub fn fault_from_error(e: &Error) -> (ErrorKind, String) {
    if let Some(err) = e.downcast_ref::<S3FetchError>() {
        return match err {
            S3FetchError::Fault { kind, message } => (*kind, message.clone()),
            S3FetchError::Cancelled => (ErrorKind::Cancelled, err.to_string()),
            other => (ErrorKind::Unknown, other.to_string()),
        };
    }
    if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
        return (ErrorKind::Filesystem, io_err.to_string());
    }
    (ErrorKind::Unknown, format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn is_cancelled_error_test() {
        assert!(is_cancelled_error(&anyhow!(S3FetchError::Cancelled)));
    }

    #[test]
    fn is_cancelled_error_false_for_other_errors() {
        assert!(!is_cancelled_error(&anyhow!(S3FetchError::Pipeline(
            "test".to_string()
        ))));
        assert!(!is_cancelled_error(&anyhow!("generic error")));
    }

    #[test]
    fn exit_code_usage_errors() {
        assert_eq!(S3FetchError::InvalidUri("bad://uri".to_string()).exit_code(), 2);
        assert_eq!(S3FetchError::InvalidRegex("[invalid".to_string()).exit_code(), 2);
        assert_eq!(S3FetchError::InvalidConfig("bad".to_string()).exit_code(), 2);
    }

    #[test]
    fn exit_code_runtime_errors() {
        assert_eq!(S3FetchError::Cancelled.exit_code(), 1);
        assert_eq!(
            S3FetchError::PartialFailure {
                downloaded: 9,
                failed: 1
            }
            .exit_code(),
            1
        );
        assert_eq!(
            S3FetchError::Fault {
                kind: ErrorKind::Network,
                message: "connection reset".to_string()
            }
            .exit_code(),
            1
        );
        assert_eq!(S3FetchError::Pipeline("stage failed".to_string()).exit_code(), 1);
    }

    #[test]
    fn exit_code_from_anyhow_error() {
        assert_eq!(exit_code_from_error(&anyhow!(S3FetchError::Cancelled)), 1);
        assert_eq!(
            exit_code_from_error(&anyhow!(S3FetchError::InvalidConfig("x".to_string()))),
            2
        );
        assert_eq!(exit_code_from_error(&anyhow!("unknown error")), 1);
    }

    #[test]
    fn classify_auth_codes() {
        assert_eq!(classify_s3_error_code("InvalidAccessKeyId"), ErrorKind::Auth);
        assert_eq!(classify_s3_error_code("SignatureDoesNotMatch"), ErrorKind::Auth);
        assert_eq!(classify_s3_error_code("ExpiredToken"), ErrorKind::Auth);
    }

    #[test]
    fn classify_not_found_codes() {
        assert_eq!(classify_s3_error_code("NoSuchBucket"), ErrorKind::NotFound);
        assert_eq!(classify_s3_error_code("NoSuchKey"), ErrorKind::NotFound);
        assert_eq!(classify_s3_error_code("NotFound"), ErrorKind::NotFound);
    }

    #[test]
    fn classify_access_denied_code() {
        assert_eq!(classify_s3_error_code("AccessDenied"), ErrorKind::AccessDenied);
    }

    #[test]
    fn classify_throttled_codes() {
        assert_eq!(classify_s3_error_code("SlowDown"), ErrorKind::Throttled);
        assert_eq!(classify_s3_error_code("TooManyRequests"), ErrorKind::Throttled);
        assert_eq!(classify_s3_error_code("Throttling"), ErrorKind::Throttled);
    }

    #[test]
    fn classify_unknown_code() {
        assert_eq!(classify_s3_error_code("SomethingElse"), ErrorKind::Unknown);
    }

    // --- classify_sdk_error against real SdkError values ---

    use aws_sdk_s3::operation::get_object::GetObjectError;
    use aws_smithy_runtime_api::client::result::ConnectorError;
    use aws_smithy_runtime_api::http::{Response, StatusCode};
    use aws_smithy_types::body::SdkBody;
    use aws_smithy_types::error::ErrorMetadata;

    fn service_error_with_code(code: &str, status: u16) -> SdkError<GetObjectError> {
        let service_err = GetObjectError::generic(
            ErrorMetadata::builder()
                .code(code)
                .message("simulated failure")
                .build(),
        );
        let raw_response = Response::new(StatusCode::try_from(status).unwrap(), SdkBody::from(""));
        SdkError::service_error(service_err, raw_response)
    }

    #[test]
    fn classify_sdk_service_error_uses_error_code() {
        let (kind, detail) = classify_sdk_error(&service_error_with_code("AccessDenied", 403));
        assert_eq!(kind, ErrorKind::AccessDenied);
        assert!(detail.contains("AccessDenied"));
        assert!(detail.contains("simulated failure"));

        let (kind, _) = classify_sdk_error(&service_error_with_code("NoSuchKey", 404));
        assert_eq!(kind, ErrorKind::NotFound);

        let (kind, _) = classify_sdk_error(&service_error_with_code("InvalidAccessKeyId", 403));
        assert_eq!(kind, ErrorKind::Auth);

        let (kind, _) = classify_sdk_error(&service_error_with_code("SlowDown", 503));
        assert_eq!(kind, ErrorKind::Throttled);
    }

    #[test]
    fn classify_sdk_service_error_unknown_code() {
        let (kind, _) = classify_sdk_error(&service_error_with_code("SomeUnknownCode", 500));
        assert_eq!(kind, ErrorKind::Unknown);
    }

    #[test]
    fn classify_sdk_timeout_error_is_network() {
        let e: SdkError<GetObjectError> = SdkError::timeout_error("operation timed out");
        let (kind, detail) = classify_sdk_error(&e);
        assert_eq!(kind, ErrorKind::Network);
        assert!(!detail.is_empty());
    }

    #[test]
    fn classify_sdk_dispatch_failure_is_network() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset");
        let e: SdkError<GetObjectError> =
            SdkError::dispatch_failure(ConnectorError::io(io_error.into()));
        let (kind, _) = classify_sdk_error(&e);
        assert_eq!(kind, ErrorKind::Network);
    }

    #[test]
    fn classify_sdk_response_error_is_network() {
        let raw_response = Response::new(StatusCode::try_from(200).unwrap(), SdkBody::from(""));
        let e: SdkError<GetObjectError> = SdkError::response_error("malformed body", raw_response);
        let (kind, _) = classify_sdk_error(&e);
        assert_eq!(kind, ErrorKind::Network);
    }

    #[test]
    fn classify_sdk_construction_failure_is_unknown() {
        let e: SdkError<GetObjectError> =
            SdkError::construction_failure("invalid request configuration");
        let (kind, _) = classify_sdk_error(&e);
        assert_eq!(kind, ErrorKind::Unknown);
    }

    #[test]
    fn fault_from_classified_error() {
        let e = anyhow!(S3FetchError::Fault {
            kind: ErrorKind::AccessDenied,
            message: "AccessDenied: no".to_string()
        });
        let (kind, message) = fault_from_error(&e);
        assert_eq!(kind, ErrorKind::AccessDenied);
        assert_eq!(message, "AccessDenied: no");
    }

    #[test]
    fn fault_from_cancelled_error() {
        let (kind, _) = fault_from_error(&anyhow!(S3FetchError::Cancelled));
        assert_eq!(kind, ErrorKind::Cancelled);
    }

    #[test]
    fn fault_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let (kind, message) = fault_from_error(&Error::from(io));
        assert_eq!(kind, ErrorKind::Filesystem);
        assert!(message.contains("denied"));
    }

    #[test]
    fn fault_from_unclassified_error() {
        let (kind, _) = fault_from_error(&anyhow!("mystery"));
        assert_eq!(kind, ErrorKind::Unknown);
    }

    #[test]
    fn error_kind_display_and_advice() {
        assert_eq!(ErrorKind::AccessDenied.to_string(), "access denied");
        assert_eq!(ErrorKind::PathEscape.to_string(), "path escape");
        assert!(ErrorKind::AccessDenied.advice().contains("permissions"));
        assert!(ErrorKind::Network.advice().contains("connectivity"));
    }

    #[test]
    fn error_display_messages() {
        assert_eq!(
            S3FetchError::InvalidUri("bad://".to_string()).to_string(),
            "Invalid S3 URI: bad://"
        );
        assert_eq!(
            S3FetchError::Cancelled.to_string(),
            "Operation cancelled by user"
        );
        assert_eq!(
            S3FetchError::PartialFailure {
                downloaded: 95,
                failed: 5
            }
            .to_string(),
            "Partial failure: 95 downloaded, 5 failed"
        );
        assert_eq!(
            S3FetchError::Fault {
                kind: ErrorKind::Throttled,
                message: "SlowDown: slow down".to_string()
            }
            .to_string(),
            "throttled: SlowDown: slow down"
        );
    }
}
