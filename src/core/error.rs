use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The closed taxonomy every request failure is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    /// The attempt exceeded its deadline or the transport aborted it.
    Timeout,
    /// A generic network or connection failure.
    ConnectionReset,
    /// HTTP 503, or a body announcing maintenance.
    ServiceUnavailable,
    /// HTTP 429.
    RateLimited,
    /// HTTP 401 or 403.
    AuthError,
    /// Any other 4xx response.
    ClientError,
    /// Anything not covered above.
    Unknown,
    /// The caller gave up on the request.
    Cancelled,
}

impl ErrorKind {
    /// Whether failures of this kind are worth another attempt.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::AuthError | Self::ClientError | Self::Cancelled)
    }

    /// A short, stable name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionReset => "connection_reset",
            Self::ServiceUnavailable => "service_unavailable",
            Self::RateLimited => "rate_limited",
            Self::AuthError => "auth_error",
            Self::ClientError => "client_error",
            Self::Unknown => "unknown",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request failure after classification.
///
/// This is what callers of [`RequestExecutor`](crate::RequestExecutor) receive. It is `Clone`
/// so that every waiter joined onto the same in-flight request observes an identical error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    /// Which bucket of the taxonomy this failure falls into.
    pub kind: ErrorKind,
    /// Whether the executor may retry it.
    pub retryable: bool,
    /// A server-provided hint for when to try again (from `Retry-After` or the body).
    pub retry_after: Option<Duration>,
    /// The HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Human readable detail.
    pub message: String,
}

impl ClassifiedError {
    /// Creates an error of `kind` with the kind's default retryability.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            retry_after: None,
            status: None,
            message: message.into(),
        }
    }

    /// The error delivered to a caller who cancelled their request.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "request cancelled by caller")
    }

    #[must_use]
    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub(crate) fn with_retry_after(mut self, hint: Option<Duration>) -> Self {
        self.retry_after = hint;
        self
    }

    #[must_use]
    pub(crate) fn not_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// True if the caller cancelled the request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

/// A raw failure reported by a transport function, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The attempt ran past its deadline.
    #[error("request timed out")]
    Timeout,

    /// The underlying operation was aborted before it produced a response.
    #[error("request aborted")]
    Aborted,

    /// The connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The server answered with an unsuccessful status code.
    #[error("unexpected response status: {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// Parsed `Retry-After` header, if any.
        retry_after: Option<Duration>,
        /// The response body, kept for maintenance and retry hints.
        body: Option<String>,
    },

    /// Anything else the transport could not do.
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                retry_after: None,
                body: None,
            }
        } else if e.is_connect() || e.is_request() || e.is_body() {
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// The primary error type of the typed [`ApiClient`](crate::ApiClient) surface.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request failed after classification and retries.
    #[error(transparent)]
    Request(#[from] ClassifiedError),

    /// An error occurred while building the HTTP client.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A provided URL or path could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The response body was not the JSON shape the caller asked for.
    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// The classified kind, when this error came from the request pipeline.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Request(e) => Some(e.kind),
            _ => None,
        }
    }
}
