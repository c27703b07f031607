//! Error taxonomy surfaced to callers and to the host observer.

use frames::{DecodeError, Estimate};

/// Error returned from host-facing session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Local action rejected by the role or phase check. Nothing was sent.
    #[error("{action} forbidden: {reason}")]
    Forbidden { action: &'static str, reason: &'static str },
    /// Vote value is not part of the session's estimation scale. Nothing was sent.
    #[error("estimate {0} is not in the estimation scale")]
    InvalidEstimate(Estimate),
    /// The session is closed; the operation was not performed.
    #[error("connection closed")]
    ConnectionClosed,
    /// The transport was lost; the session is terminated.
    #[error("disconnected: {0}")]
    TerminalDisconnect(String),
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Forbidden { action, reason } => ErrorKind::Forbidden { action: *action, reason: *reason },
            Self::InvalidEstimate(value) => ErrorKind::InvalidEstimate(*value),
            Self::ConnectionClosed => ErrorKind::ConnectionClosed,
            Self::TerminalDisconnect(reason) => ErrorKind::TerminalDisconnect(reason.clone()),
        }
    }
}

/// What the host is told through `on_error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// An inbound frame was malformed and dropped. The session continues.
    #[error("malformed frame dropped: {0}")]
    Decode(String),
    #[error("{action} forbidden: {reason}")]
    Forbidden { action: &'static str, reason: &'static str },
    #[error("estimate {0} is not in the estimation scale")]
    InvalidEstimate(Estimate),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("disconnected: {0}")]
    TerminalDisconnect(String),
    /// The authority rejected one of this participant's requests.
    #[error("rejected by server: {0}")]
    ServerRejected(String),
}

impl From<&DecodeError> for ErrorKind {
    fn from(error: &DecodeError) -> Self {
        Self::Decode(error.to_string())
    }
}
