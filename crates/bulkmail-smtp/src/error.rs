//! Error types for SMTP operations.

use std::io;
use std::time::Duration;

use crate::types::ReplyCode;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The stream could not be opened or the TLS handshake failed.
    Connection,
    /// Unexpected reply, malformed reply, peer closed, or timed out mid-exchange.
    Protocol,
    /// The AUTH LOGIN exchange was rejected.
    Authentication,
    /// A syntactic check failed before any network activity.
    Validation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connection => "connection",
            Self::Protocol => "protocol",
            Self::Authentication => "authentication",
            Self::Validation => "validation",
        };
        f.write_str(name)
    }
}

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on an established stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The TCP connection could not be opened.
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        /// `host:port` that was dialed.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The TLS handshake failed.
    #[error("TLS handshake with {host} failed: {source}")]
    Handshake {
        /// Relay hostname the certificate was verified against.
        host: String,
        /// Underlying handshake error.
        #[source]
        source: io::Error,
    },

    /// Hostname is not a valid TLS server name.
    #[error("Invalid hostname: {0}")]
    InvalidHostname(String),

    /// Server answered with a different code than the one expected.
    #[error("Expected reply {expected}, got {code}: {message}")]
    UnexpectedReply {
        /// Code the client was waiting for.
        expected: ReplyCode,
        /// Code the server sent.
        code: ReplyCode,
        /// Server text.
        message: String,
    },

    /// Protocol error (malformed reply line).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server closed the stream while a reply was expected.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// A network operation did not complete in time.
    #[error("Timed out after {after:?} during {during}")]
    Timeout {
        /// Configured timeout.
        after: Duration,
        /// Operation that was pending.
        during: &'static str,
    },

    /// The AUTH LOGIN exchange failed.
    #[error("Authentication failed: {0}")]
    Authentication(#[source] Box<Error>),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid session configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Creates an unexpected-reply error.
    #[must_use]
    pub fn unexpected(expected: ReplyCode, code: ReplyCode, message: impl Into<String>) -> Self {
        Self::UnexpectedReply {
            expected,
            code,
            message: message.into(),
        }
    }

    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect { .. } | Self::Handshake { .. } | Self::InvalidHostname(_) => {
                ErrorKind::Connection
            }
            Self::Io(_)
            | Self::UnexpectedReply { .. }
            | Self::Protocol(_)
            | Self::ConnectionClosed
            | Self::Timeout { .. } => ErrorKind::Protocol,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::InvalidAddress(_) | Self::InvalidConfig(_) => ErrorKind::Validation,
        }
    }

    /// Returns true if a fresh attempt could succeed.
    ///
    /// Validation errors never are. Authentication errors are only when
    /// `retry_auth` is set.
    #[must_use]
    pub const fn is_retryable(&self, retry_auth: bool) -> bool {
        match self.kind() {
            ErrorKind::Connection | ErrorKind::Protocol => true,
            ErrorKind::Authentication => retry_auth,
            ErrorKind::Validation => false,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let refused = Error::Connect {
            addr: "smtp.example.com:587".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(refused.kind(), ErrorKind::Connection);
        assert_eq!(Error::ConnectionClosed.kind(), ErrorKind::Protocol);
        assert_eq!(
            Error::unexpected(ReplyCode::OK, ReplyCode::MAILBOX_UNAVAILABLE, "no").kind(),
            ErrorKind::Protocol
        );
        let auth = Error::Authentication(Box::new(Error::unexpected(
            ReplyCode::AUTH_SUCCEEDED,
            ReplyCode::AUTH_FAILED,
            "bad credentials",
        )));
        assert_eq!(auth.kind(), ErrorKind::Authentication);
        assert_eq!(
            Error::InvalidAddress("x".into()).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_retryable() {
        let auth = Error::Authentication(Box::new(Error::ConnectionClosed));
        assert!(auth.is_retryable(true));
        assert!(!auth.is_retryable(false));
        assert!(Error::ConnectionClosed.is_retryable(false));
        assert!(!Error::InvalidConfig("port".into()).is_retryable(true));
    }

    #[test]
    fn test_unexpected_reply_display() {
        let err = Error::unexpected(
            ReplyCode::START_DATA,
            ReplyCode::TRANSACTION_FAILED,
            "rejected",
        );
        assert_eq!(err.to_string(), "Expected reply 354, got 554: rejected");
    }
}
