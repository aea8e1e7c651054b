//! Error types delivered to failure callbacks.
//!
//! # Design
//! Every failure a dispatch can produce is one `WebError` variant. All of
//! them are terminal: nothing is retried, and each is reported at most once
//! through the failure callback. Callers that only need a flat
//! domain/code/detail triple (for example across the C boundary) use the
//! accessor methods instead of matching on variants.

use std::fmt;

use thiserror::Error;

/// Error codes for non-HTTP failures. HTTP failures use the status code.
pub mod codes {
    pub const UNKNOWN: i64 = -1;
    pub const BAD_URL: i64 = -1000;
    pub const TIMED_OUT: i64 = -1001;
    pub const CANNOT_FIND_HOST: i64 = -1003;
    pub const CANNOT_CONNECT: i64 = -1004;
    pub const CONNECTION_LOST: i64 = -1005;
    pub const CANNOT_DECODE: i64 = -1016;
    pub const SECURE_CONNECTION_FAILED: i64 = -1200;
}

/// Broad category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Dns,
    Connection,
    Tls,
    Io,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Timeout => write!(f, "timed out"),
            TransportErrorKind::Dns => write!(f, "host not found"),
            TransportErrorKind::Connection => write!(f, "connection failed"),
            TransportErrorKind::Tls => write!(f, "TLS failure"),
            TransportErrorKind::Io => write!(f, "I/O failure"),
            TransportErrorKind::Other => write!(f, "transport failure"),
        }
    }
}

/// A failure below HTTP: no response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn code(&self) -> i64 {
        match self.kind {
            TransportErrorKind::Timeout => codes::TIMED_OUT,
            TransportErrorKind::Dns => codes::CANNOT_FIND_HOST,
            TransportErrorKind::Connection => codes::CANNOT_CONNECT,
            TransportErrorKind::Tls => codes::SECURE_CONNECTION_FAILED,
            TransportErrorKind::Io => codes::CONNECTION_LOST,
            TransportErrorKind::Other => codes::UNKNOWN,
        }
    }
}

/// Errors delivered to a request's failure callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebError {
    /// The URL string could not be parsed as an absolute URL.
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The request never produced a response (connect, DNS, timeout, ...).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a status outside 200..=300.
    #[error("HTTP {status} for {path}")]
    Http { path: String, status: u16 },

    /// The response was declared `application/json` but did not parse.
    #[error("invalid JSON body: {message}")]
    Decode { message: String },
}

impl WebError {
    /// The error domain: the request path for HTTP errors, otherwise a
    /// fixed category name.
    pub fn domain(&self) -> &str {
        match self {
            WebError::InvalidUrl { .. } => "webclient.invalid_url",
            WebError::Transport(_) => "webclient.transport",
            WebError::Http { path, .. } => path,
            WebError::Decode { .. } => "webclient.decode",
        }
    }

    /// The HTTP status for HTTP errors, otherwise one of [`codes`].
    pub fn code(&self) -> i64 {
        match self {
            WebError::InvalidUrl { .. } => codes::BAD_URL,
            WebError::Transport(err) => err.code(),
            WebError::Http { status, .. } => i64::from(*status),
            WebError::Decode { .. } => codes::CANNOT_DECODE,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            WebError::InvalidUrl { reason, .. } => Some(reason),
            WebError::Transport(err) => Some(&err.message),
            WebError::Http { .. } => None,
            WebError::Decode { message } => Some(message),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            WebError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for WebError {
    fn from(err: serde_json::Error) -> Self {
        WebError::Decode {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_descriptor() {
        let err = WebError::Http {
            path: "/missing".to_string(),
            status: 404,
        };
        assert_eq!(err.domain(), "/missing");
        assert_eq!(err.code(), 404);
        assert_eq!(err.detail(), None);
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "HTTP 404 for /missing");
    }

    #[test]
    fn transport_error_codes() {
        let err: WebError = TransportError::new(TransportErrorKind::Timeout, "30s elapsed").into();
        assert_eq!(err.code(), codes::TIMED_OUT);
        assert_eq!(err.domain(), "webclient.transport");
        assert_eq!(err.detail(), Some("30s elapsed"));
        assert_eq!(err.to_string(), "transport error: timed out: 30s elapsed");
    }

    #[test]
    fn decode_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err = WebError::from(serde_err);
        assert!(matches!(err, WebError::Decode { .. }));
        assert_eq!(err.code(), codes::CANNOT_DECODE);
        assert!(err.status().is_none());
    }
}
