//! Transport error types with retry classification.
//!
//! Distinguishes between transient failures (the next poll tick or a manual
//! re-subscribe may succeed) and permanent ones (the request itself is wrong).

use thiserror::Error;

/// Error from the socket or poll transport.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    /// The kind of error
    pub kind: TransportErrorKind,
    /// Error message
    pub message: String,
}

impl TransportError {
    /// Create a connection error (DNS, refused, reset, timeout).
    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Connect,
            message: message.into(),
        }
    }

    /// Create an error for a non-success HTTP response.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Http { status },
            message: message.into(),
        }
    }

    /// Create a payload decoding error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Decode,
            message: message.into(),
        }
    }

    /// Create an error for a stream the server closed.
    pub fn closed(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Closed,
            message: message.into(),
        }
    }

    /// Check if this error is transient and a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::decode(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::http(status.as_u16(), err.to_string())
        } else {
            TransportError::connect(err.to_string())
        }
    }
}

/// Classification of transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not reach the server - transient
    Connect,
    /// Server answered with a non-success status
    Http { status: u16 },
    /// Response body was not what we expected - usually permanent
    Decode,
    /// Server ended the stream - transient
    Closed,
}

impl TransportErrorKind {
    pub fn is_transient(&self) -> bool {
        match self {
            TransportErrorKind::Connect | TransportErrorKind::Closed => true,
            TransportErrorKind::Http { status } => *status == 429 || *status >= 500,
            TransportErrorKind::Decode => false,
        }
    }
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::Connect => write!(f, "connection error"),
            TransportErrorKind::Http { status } => write!(f, "HTTP {}", status),
            TransportErrorKind::Decode => write!(f, "decode error"),
            TransportErrorKind::Closed => write!(f, "stream closed"),
        }
    }
}
