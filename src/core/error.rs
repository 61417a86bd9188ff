//! Error taxonomy for the lookout engine.
//!
//! Every backend, cache and renderer failure is expressed as a [BrowseError] carrying an
//! [ErrorKind]. The kind drives retry decisions in the backends and the `Error(kind)` state of
//! the navigation state machine; the message is what ends up in the preview pane.
//!
//! Errors are `Clone` so a single failed fetch can be handed to every caller that was
//! coalesced onto it by the directory cache.

use std::fmt;
use std::io;

/// Result alias used across `core`.
pub type Result<T> = std::result::Result<T, BrowseError>;

/// Classification of a failure.
///
/// `Truncated` is intentionally absent: truncation is a flag on render results, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Auth,
    Network,
    Configuration,
    UnsupportedFormat,
    Internal,
}

impl ErrorKind {
    /// Short label used in the status line.
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::Auth => "authentication failed",
            ErrorKind::Network => "network error",
            ErrorKind::Configuration => "configuration error",
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The single error type of the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BrowseError {
    kind: ErrorKind,
    message: String,
}

impl BrowseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedFormat, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Only transient network failures are worth another attempt.
    /// Auth, permission and not-found failures are final.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Network
    }
}

impl From<io::Error> for BrowseError {
    fn from(e: io::Error) -> Self {
        let kind = match e.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => ErrorKind::Network,
            io::ErrorKind::InvalidInput => ErrorKind::Configuration,
            io::ErrorKind::InvalidData => ErrorKind::UnsupportedFormat,
            _ => ErrorKind::Internal,
        };
        BrowseError::new(kind, e.to_string())
    }
}
