//! Transfer errors.

use std::time::Duration;

use imgwire_core::WireError;

use crate::session::Role;

/// The three ways a transfer can fail, as seen by a caller deciding
/// whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nobody showed up in time. A new session may succeed.
    ConnectionTimeout,
    /// The peer, or the caller, broke the protocol.
    ProtocolViolation,
    /// The socket failed underneath the protocol.
    TransportFault,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("{waiter}: nothing arrived within {}s", .waited.as_secs())]
    ConnectionTimeout { waiter: String, waited: Duration },

    #[error("protocol error: {0}")]
    Protocol(#[from] WireError),

    #[error("protocol error: expected '{expected}' from the peer, got '{got}'")]
    UnexpectedReply { expected: &'static str, got: String },

    #[error("transport fault: {0}")]
    Transport(#[from] std::io::Error),

    #[error("session already closed")]
    SessionClosed,

    #[error("wrong role: {op} is not available to a {role} session")]
    WrongRole { op: &'static str, role: Role },
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::ConnectionTimeout { .. } => ErrorKind::ConnectionTimeout,
            TransferError::Protocol(_)
            | TransferError::UnexpectedReply { .. }
            | TransferError::SessionClosed
            | TransferError::WrongRole { .. } => ErrorKind::ProtocolViolation,
            TransferError::Transport(_) => ErrorKind::TransportFault,
        }
    }

    pub(crate) fn timeout(waiter: &str, waited: Duration) -> Self {
        TransferError::ConnectionTimeout {
            waiter: waiter.to_string(),
            waited,
        }
    }

    pub(crate) fn peer_gone() -> Self {
        TransferError::Transport(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "peer closed the connection",
        ))
    }
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;
