//! Canonical error taxonomy shared by every provider adapter.

use snafu::Snafu;
use std::fmt;

pub mod mapper;

pub use mapper::{extract_message, map_http_error};

/// The provider-independent classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or rejected input; retrying without a change will not help.
    InvalidRequest,
    AuthenticationFailed,
    PermissionDenied,
    /// The job or resource does not exist.
    NotFound,
    Timeout,
    UnprocessableRequest,
    RateLimited,
    ServiceUnavailable,
    /// Vendor-side 5xx other than 503.
    ProviderError,
    /// No usable response was received.
    ConnectionFailed,
    /// The result locator found no candidate object.
    ResultsNotFound,
    /// A non-empty submission contained no usable request item.
    EncodingFailed,
}

impl ErrorKind {
    /// Transient failures a higher layer may retry with backoff.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::ServiceUnavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UnprocessableRequest => "unprocessable_request",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::ProviderError => "provider_error",
            ErrorKind::ConnectionFailed => "connection_failed",
            ErrorKind::ResultsNotFound => "results_not_found",
            ErrorKind::EncodingFailed => "encoding_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The provider answered with a non-2xx status.
    #[snafu(display("{operation} failed with HTTP {status} ({kind}): {message}"))]
    Api {
        kind: ErrorKind,
        status: u16,
        operation: String,
        message: String,
    },

    #[snafu(display("{operation} failed before a response was received"))]
    Transport {
        operation: String,
        source: reqwest::Error,
    },

    #[snafu(display("{operation} could not be decoded"))]
    Decode {
        operation: String,
        source: serde_json::Error,
    },

    #[snafu(display("invalid url '{url}'"))]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[snafu(display("invalid value for header '{name}'"))]
    InvalidHeader {
        name: String,
        source: reqwest::header::InvalidHeaderValue,
    },

    #[snafu(display("no credentials available for provider '{provider}'"))]
    MissingCredentials { provider: String },

    #[snafu(display("invalid batch request: {message}"))]
    InvalidRequest { message: String },

    #[snafu(display("none of the {lines} submitted line(s) contained a usable request body"))]
    EncodingFailed { lines: usize },

    #[snafu(display("no result objects found under '{location}'"))]
    ResultsNotFound { location: String },

    #[snafu(display("result pointer '{pointer}' cannot be resolved by {provider}"))]
    UnsupportedPointer { pointer: String, provider: String },

    #[snafu(display("batch '{id}' did not reach a terminal status within {seconds}s"))]
    WaitTimeout { id: String, seconds: u64 },

    #[snafu(display("failed to start the blocking runtime"))]
    Runtime { source: std::io::Error },
}

impl Error {
    /// The canonical classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Api { kind, .. } => *kind,
            Error::Transport { .. } | Error::Runtime { .. } => ErrorKind::ConnectionFailed,
            Error::Decode { .. } => ErrorKind::ProviderError,
            Error::InvalidUrl { .. }
            | Error::InvalidHeader { .. }
            | Error::InvalidRequest { .. }
            | Error::UnsupportedPointer { .. } => ErrorKind::InvalidRequest,
            Error::MissingCredentials { .. } => ErrorKind::AuthenticationFailed,
            Error::EncodingFailed { .. } => ErrorKind::EncodingFailed,
            Error::ResultsNotFound { .. } => ErrorKind::ResultsNotFound,
            Error::WaitTimeout { .. } => ErrorKind::Timeout,
        }
    }

    /// The HTTP status the provider answered with, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
