use std::fmt;
use std::time::Duration;

use sealtrust::SealTrustError;
use thiserror::Error;

/// Coarse failure class, used by callers to pick a remediation.
///
/// `Transport` points at the network; `Authentication` at the shared secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Framing,
    Cipher,
    Authentication,
    ProtocolState,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Framing => write!(f, "framing"),
            ErrorKind::Cipher => write!(f, "cipher"),
            ErrorKind::Authentication => write!(f, "authentication"),
            ErrorKind::ProtocolState => write!(f, "protocol state"),
        }
    }
}

/// All errors produced by the SealStream session layer.
#[derive(Debug, Error)]
pub enum SealStreamError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    #[error("truncated {context}: expected {expected} bytes, got {actual}")]
    Truncated {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: u64, max: usize },

    #[error(transparent)]
    Protocol(#[from] SealTrustError),

    #[error("session not established (state: {state})")]
    NotEstablished { state: String },
}

impl SealStreamError {
    /// Map this error onto the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SealStreamError::Io(_)
            | SealStreamError::ConnectionClosed
            | SealStreamError::Timeout(..) => ErrorKind::Transport,
            SealStreamError::Truncated { .. } | SealStreamError::FrameTooLarge { .. } => {
                ErrorKind::Framing
            }
            SealStreamError::NotEstablished { .. } => ErrorKind::ProtocolState,
            SealStreamError::Protocol(e) => match e {
                SealTrustError::Authentication(_) => ErrorKind::Authentication,
                SealTrustError::Malformed { .. } => ErrorKind::Framing,
                SealTrustError::InvalidStateTransition { .. } => ErrorKind::ProtocolState,
                _ => ErrorKind::Cipher,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, SealStreamError>;
