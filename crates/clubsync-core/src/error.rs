//! Shared error type across clubsync crates.

use thiserror::Error;

/// Stable error classification exposed to collaborators (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect refused, send failure, mid-stream read failure.
    Transport,
    /// Malformed frame, unknown type, payload shape mismatch.
    Protocol,
    /// A correlated call exceeded its deadline.
    Timeout,
    /// The server answered with a `*.fail` response.
    Rejected,
    /// Invalid client configuration.
    Config,
    /// Internal invariant violation.
    Internal,
}

impl ErrorKind {
    /// String representation used in logs and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::Protocol => "PROTOCOL",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Rejected => "REJECTED",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("call timed out")]
    Timeout,
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl SyncError {
    /// Map an error to its stable classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Transport(_) => ErrorKind::Transport,
            SyncError::Protocol(_) => ErrorKind::Protocol,
            SyncError::Timeout => ErrorKind::Timeout,
            SyncError::Rejected(_) => ErrorKind::Rejected,
            SyncError::Config(_) => ErrorKind::Config,
            SyncError::Internal(_) => ErrorKind::Internal,
        }
    }
}
