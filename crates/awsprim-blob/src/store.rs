//! S3 client construction and error classification.

use std::time::Duration;

use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::Client;
use aws_smithy_types::timeout::TimeoutConfig;
use awsprim_core::PrimitiveError;

/// S3 connection settings.
#[derive(Debug, Clone, Default)]
pub struct BlobStoreConfig {
    /// Optional region override.
    pub region: Option<String>,
    /// Optional endpoint override (e.g. a local emulator).
    pub endpoint: Option<String>,
    /// Operation timeout, including SDK retries.
    pub timeout: Option<Duration>,
}

/// Shared S3 client handle.
#[derive(Clone)]
pub struct BlobStore {
    client: Client,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore").finish()
    }
}

impl BlobStore {
    /// Build a client from a shared SDK config plus per-store overrides.
    pub fn new(sdk_config: &aws_config::SdkConfig, config: BlobStoreConfig) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);
        if let Some(region) = config.region {
            builder = builder.region(aws_sdk_s3::config::Region::new(region));
        }
        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        if let Some(timeout) = config.timeout {
            builder = builder
                .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
        }
        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Wrap a pre-built client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Classify an S3 SDK failure by HTTP status.
pub(crate) fn classify<E: std::fmt::Debug>(err: &SdkError<E>, what: &str) -> PrimitiveError {
    match err {
        SdkError::ServiceError(ctx) => {
            let status = ctx.raw().status().as_u16();
            match status {
                404 => PrimitiveError::NotFound {
                    message: format!("{what} not found"),
                    solution: "Check the bucket and key; list the prefix to see what exists."
                        .to_string(),
                },
                401 | 403 => PrimitiveError::PermissionDenied {
                    message: format!("access denied for {what}"),
                },
                412 => PrimitiveError::ConditionFailed {
                    message: format!("precondition failed for {what}"),
                    solution: "The object changed since the ETag was read; re-read and retry."
                        .to_string(),
                },
                429 | 500 | 502 | 503 | 504 => PrimitiveError::Throttled {
                    message: format!("retryable service error for {what} (HTTP {status})"),
                },
                _ => PrimitiveError::Service {
                    message: format!("service error for {what} (HTTP {status}): {err:?}"),
                },
            }
        }
        SdkError::TimeoutError(_) => PrimitiveError::Service {
            message: format!("request timed out for {what}"),
        },
        SdkError::DispatchFailure(_) => PrimitiveError::Service {
            message: format!("connection failure for {what}"),
        },
        other => PrimitiveError::Service {
            message: format!("service error for {what}: {other:?}"),
        },
    }
}

/// True for HTTP 412 responses, used by the conditional put modes.
pub(crate) fn is_precondition_failed<E: std::fmt::Debug>(err: &SdkError<E>) -> bool {
    matches!(err, SdkError::ServiceError(ctx) if ctx.raw().status().as_u16() == 412)
}
