// Handshake module declarations

pub mod messages;
pub mod protocol;
pub mod state;

use std::fmt;

/// Which side of the handshake a peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends `Begin` first (the connecting side).
    Initiator,
    /// Waits for `Begin` (the listening side).
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}
