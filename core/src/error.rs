//! Error types for the Elephantasm client.
//!
//! # Design
//! Every failure surfaces as one `Error` value. Variants that come from an
//! HTTP status carry the server's `detail` message verbatim; locally raised
//! variants carry a message describing the rejected input. `ErrorKind` is the
//! flat classification callers branch on when deciding whether to retry.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by `Elephantasm` operations and `ApiClient` parse methods.
#[derive(Debug, Error)]
pub enum Error {
    /// A required setting (the API key) is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input was rejected, either locally before any request was sent
    /// (`status` is `None`) or by the server with a 4xx other than
    /// 401/403/404/429.
    #[error("validation failed: {message}")]
    Validation { message: String, status: Option<u16> },

    /// The server rejected the credential (401 or 403).
    #[error("authentication failed: {message}")]
    Authentication { message: String, status: u16 },

    /// The referenced entity does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was throttled (429).
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// The server failed (5xx) or answered with a status outside 2xx/4xx.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// No response arrived within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The request could not be sent or the response could not be read.
    #[error("transport error: {0}")]
    Transport(String),

    /// A success response whose body does not match the expected model.
    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    /// The client was closed; no further requests are sent.
    #[error("client is closed")]
    Closed,
}

/// Flat classification of an `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Validation,
    Authentication,
    NotFound,
    RateLimit,
    Server,
    Timeout,
    Transport,
    Closed,
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            status: None,
        }
    }

    /// Map a non-success HTTP status and its extracted message to an error.
    ///
    /// Total over all statuses: anything that is not a recognised 4xx lands
    /// in `Validation` (other 4xx) or `Server` (5xx and everything else).
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Error::Authentication { message, status },
            404 => Error::NotFound(message),
            429 => Error::RateLimit(message),
            400..=499 => Error::Validation {
                message,
                status: Some(status),
            },
            _ => Error::Server { status, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Authentication { .. } => ErrorKind::Authentication,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::RateLimit(_) => ErrorKind::RateLimit,
            Error::Server { .. } | Error::InvalidResponse(_) => ErrorKind::Server,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Closed => ErrorKind::Closed,
        }
    }

    /// HTTP status behind this error, if it came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Validation { status, .. } => *status,
            Error::Authentication { status, .. } => Some(*status),
            Error::NotFound(_) => Some(404),
            Error::RateLimit(_) => Some(429),
            Error::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether repeating the same request later may succeed. The client
    /// never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::InvalidResponse(_) => false,
            other => matches!(
                other.kind(),
                ErrorKind::RateLimit | ErrorKind::Server | ErrorKind::Timeout | ErrorKind::Transport
            ),
        }
    }
}
